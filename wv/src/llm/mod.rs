//! LLM client seam
//!
//! Processors call `complete` and nothing else; routing a capability to a
//! concrete model, provider fallbacks, and provider-side retries all live
//! behind the trait.

mod anthropic;
mod capability;
pub mod client;
mod error;
mod types;

pub use anthropic::AnthropicClient;
pub use capability::{CapabilityResolver, ConfigCapabilityResolver};
pub use client::LlmClient;
pub use error::LlmError;
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, Role};
