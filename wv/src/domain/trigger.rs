//! Trigger message envelope and payload

use serde::{Deserialize, Serialize};

use super::plan::FocusArea;

/// Classifies a message on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageType {
    pub domain: String,
    pub category: String,
    pub version: String,
}

/// The wrapping envelope every workflow message travels in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub source: String,
}

/// Typed inner payload of a workflow trigger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowTrigger {
    pub request_id: String,
    pub slug: String,
    pub title: String,
    pub prompt: String,
    pub trace_id: String,
    pub loop_id: String,

    /// Selects workflow mode when non-empty
    pub execution_id: String,

    /// Selects callback mode when non-empty and no execution id is set
    pub callback_subject: String,

    pub task_id: String,

    /// Explicit focus areas for plan coordination; empty means "derive"
    pub focus_areas: Vec<FocusArea>,

    /// Per-trigger clamp on concurrent planners; zero means "no clamp"
    pub max_planners: usize,
}

impl WorkflowTrigger {
    /// Workflow mode takes precedence over callback mode
    pub fn is_workflow_mode(&self) -> bool {
        !self.execution_id.is_empty()
    }
}
