//! LLM request/response types

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a completion conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything needed for one LLM call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Abstract capability, routed to a model by the client
    pub capability: String,

    /// Explicit model override; empty means "route by capability"
    pub model: String,

    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// A single-user-message request under a capability
    pub fn for_capability(capability: impl Into<String>, system_prompt: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            model: String::new(),
            system_prompt: system_prompt.into(),
            messages: vec![ChatMessage::user(user)],
            max_tokens: 8192,
        }
    }
}

/// Response from a completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub content: String,
    pub tokens_used: u64,
    /// Model that actually served the request
    pub model: String,
    /// Provider-side request id, for tracing
    pub request_id: String,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}
