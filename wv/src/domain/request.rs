//! Context build requests

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for incoming requests
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("request_id must not be empty")]
    MissingRequestId,

    #[error("review requests require files or a git ref")]
    ReviewNeedsTarget,
}

/// The kind of activity a context is being built for
///
/// Each task type selects a dedicated strategy with its own priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    Review,
    Implementation,
    Exploration,
    PlanReview,
    Planning,
    Question,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Review => "review",
            TaskType::Implementation => "implementation",
            TaskType::Exploration => "exploration",
            TaskType::PlanReview => "plan-review",
            TaskType::Planning => "planning",
            TaskType::Question => "question",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to assemble an LLM input context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBuildRequest {
    /// Correlation id; response subject and KV key derive from it
    pub request_id: String,

    /// Selects the strategy
    pub task_type: TaskType,

    /// Owning workflow, if any
    pub workflow_id: String,

    /// Explicitly requested source files
    pub files: Vec<String>,

    /// Git ref or range for review diffs
    pub git_ref: String,

    /// Free-form topic used for entity and keyword matching
    pub topic: String,

    /// Graph entity id of the spec being implemented
    pub spec_entity_id: String,

    /// Slug of the plan under work
    pub plan_slug: String,

    /// Current plan content, for revisions and plan review
    pub plan_content: String,

    /// Scope glob patterns
    pub scope_patterns: Vec<String>,

    /// Capability to resolve to a model for budget sizing
    pub capability: String,

    /// Explicit model name, used when no capability is given
    pub model: String,

    /// Explicit token budget; zero means "derive from model info"
    pub token_budget: usize,
}

impl Default for ContextBuildRequest {
    fn default() -> Self {
        Self {
            request_id: String::new(),
            task_type: TaskType::Exploration,
            workflow_id: String::new(),
            files: Vec::new(),
            git_ref: String::new(),
            topic: String::new(),
            spec_entity_id: String::new(),
            plan_slug: String::new(),
            plan_content: String::new(),
            scope_patterns: Vec::new(),
            capability: String::new(),
            model: String::new(),
            token_budget: 0,
        }
    }
}

impl ContextBuildRequest {
    /// Check the structural constraints a request must satisfy
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.request_id.is_empty() {
            return Err(RequestError::MissingRequestId);
        }
        if self.task_type == TaskType::Review && self.files.is_empty() && self.git_ref.is_empty() {
            return Err(RequestError::ReviewNeedsTarget);
        }
        Ok(())
    }
}
