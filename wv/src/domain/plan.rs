//! Plan coordination session types
//!
//! Sessions are in-memory only; they exist for the duration of one
//! coordination call and reference planners by session-local id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a coordination session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Coordinating,
    Planning,
    Synthesizing,
    Complete,
}

/// Lifecycle of one worker planner within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A focus area assigned to one worker planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusArea {
    pub area: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl FocusArea {
    /// The single fallback focus used when decomposition fails
    pub fn general() -> Self {
        Self {
            area: "general".into(),
            description: "Overall plan covering the full prompt".into(),
            hints: Vec::new(),
        }
    }
}

/// Scope lists of a plan draft
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanScope {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub do_not_touch: Vec<String>,
}

/// One planner's produced plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanDraft {
    pub goal: String,
    pub context: String,
    pub scope: PlanScope,
}

/// State of one worker planner
#[derive(Debug, Clone)]
pub struct PlannerState {
    pub status: PlannerStatus,
    pub focus_area: FocusArea,
    pub result: Option<PlanDraft>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlannerState {
    pub fn pending(focus_area: FocusArea) -> Self {
        Self {
            status: PlannerStatus::Pending,
            focus_area,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// An in-memory coordination session
#[derive(Debug, Clone)]
pub struct PlanSession {
    pub session_id: String,
    pub slug: String,
    pub status: SessionStatus,
    pub planners: HashMap<String, PlannerState>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlanSession {
    pub fn new(session_id: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            slug: slug.into(),
            status: SessionStatus::Coordinating,
            planners: HashMap::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
