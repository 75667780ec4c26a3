//! Context build responses and provenance

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::request::{ContextBuildRequest, TaskType};
use super::result::Question;

/// Type tag for a provenance entry, derived from the source name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Sops,
    GitDiff,
    Tests,
    Spec,
    CodebaseSummary,
    SourceFiles,
    FileTree,
    PlanContent,
    Convention,
    ArchDoc,
    Doc,
    Entity,
    Pattern,
    Standards,
    File,
}

impl SourceType {
    /// Map an allocation source name to its type tag
    pub fn from_source_name(name: &str) -> Self {
        match name {
            "sops" => SourceType::Sops,
            "git_diff" => SourceType::GitDiff,
            "tests" => SourceType::Tests,
            "spec" => SourceType::Spec,
            "codebase_summary" => SourceType::CodebaseSummary,
            "source_files" | "requested_files" => SourceType::SourceFiles,
            "file_tree" => SourceType::FileTree,
            "plan_content" => SourceType::PlanContent,
            "standards" => SourceType::Standards,
            _ => {
                if name.starts_with("convention:") {
                    SourceType::Convention
                } else if name.starts_with("arch:") {
                    SourceType::ArchDoc
                } else if name.starts_with("doc:") {
                    SourceType::Doc
                } else if name.starts_with("entity:") {
                    SourceType::Entity
                } else if name.starts_with("pattern:") {
                    SourceType::Pattern
                } else {
                    SourceType::File
                }
            }
        }
    }
}

/// One entry in the ordered provenance record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// Allocation source name
    pub source: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub tokens: usize,
    /// Zero-based position in allocation order
    pub priority: usize,
}

/// The full result of a context build, mirrored back to the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBuildResponse {
    pub request_id: String,
    pub task_type: Option<TaskType>,
    pub workflow_id: String,

    pub entities: Vec<String>,
    pub documents: BTreeMap<String, String>,
    pub diffs: Vec<String>,

    /// Ordered by allocation order; priority equals index
    pub provenance: Vec<ProvenanceEntry>,

    pub sop_ids: Vec<String>,
    pub sop_requirements: Vec<String>,

    pub questions: Vec<Question>,
    pub insufficient_context: bool,

    /// Equals the final allocation total
    pub tokens_used: usize,
    pub tokens_budget: usize,
    pub truncated: bool,

    /// Single failure reason when construction failed
    pub error: String,
}

impl ContextBuildResponse {
    /// An empty response carrying request identity and a failure reason
    pub fn failed(req: &ContextBuildRequest, budget: usize, error: impl Into<String>) -> Self {
        Self {
            request_id: req.request_id.clone(),
            task_type: Some(req.task_type),
            workflow_id: req.workflow_id.clone(),
            tokens_budget: budget,
            error: error.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_mapping() {
        assert_eq!(SourceType::from_source_name("git_diff"), SourceType::GitDiff);
        assert_eq!(SourceType::from_source_name("codebase_summary"), SourceType::CodebaseSummary);
        assert_eq!(SourceType::from_source_name("requested_files"), SourceType::SourceFiles);
        assert_eq!(SourceType::from_source_name("convention:.editorconfig"), SourceType::Convention);
        assert_eq!(SourceType::from_source_name("arch:docs/arch.md"), SourceType::ArchDoc);
        assert_eq!(SourceType::from_source_name("entity:code.func.foo"), SourceType::Entity);
        assert_eq!(SourceType::from_source_name("pattern:retry"), SourceType::Pattern);
        assert_eq!(SourceType::from_source_name("src/main.rs"), SourceType::File);
    }

    #[test]
    fn test_failed_response_carries_identity() {
        let req = ContextBuildRequest {
            request_id: "r-9".into(),
            task_type: TaskType::Implementation,
            ..Default::default()
        };
        let resp = ContextBuildResponse::failed(&req, 4000, "spec missing");
        assert_eq!(resp.request_id, "r-9");
        assert_eq!(resp.tokens_budget, 4000);
        assert_eq!(resp.tokens_used, 0);
        assert_eq!(resp.error, "spec missing");
    }
}
