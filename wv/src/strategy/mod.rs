//! Task-typed context strategies
//!
//! Every strategy fills a `BudgetAllocation` from the gatherers in its own
//! fixed priority order; items later in the order never preempt earlier
//! ones. When a source cannot fit, the per-source policy decides:
//! all-or-nothing (surface an error), truncate (clip and flag), or
//! skip-if-too-small (guarded by the thresholds below).
//!
//! Expected context-sufficiency problems are encoded in the result, never
//! returned as errors. Cancellation is cooperative: every suspension point
//! is an await, so dropping the future aborts the build.

use async_trait::async_trait;

use crate::budget::BudgetAllocation;
use crate::domain::{ContextBuildRequest, StrategyResult, TaskType};
use crate::gather::{FilesGatherer, GraphGatherer, VcsGatherer};

mod exploration;
mod implementation;
mod keywords;
mod plan_review;
mod planning;
mod question;
mod review;

pub use exploration::ExplorationStrategy;
pub use implementation::ImplementationStrategy;
pub use keywords::extract_keywords;
pub use plan_review::PlanReviewStrategy;
pub use planning::PlanningStrategy;
pub use question::QuestionStrategy;
pub use review::ReviewStrategy;

/// Skip thresholds: a source is skipped outright when less than this many
/// tokens remain for it
pub const MIN_TOKENS_FOR_TESTS: usize = 1000;
pub const MIN_TOKENS_FOR_CONVENTIONS: usize = 500;
pub const MIN_TOKENS_FOR_DOCS: usize = 300;
pub const MIN_TOKENS_FOR_PARTIAL: usize = 200;
pub const MIN_TOKENS_FOR_PATTERNS: usize = 1000;

/// Token cap on the project file tree in planning contexts
pub const FILE_TREE_TOKEN_CAP: usize = 500;

/// Token cap on the file tree in plan-review contexts
pub const PLAN_REVIEW_FILE_TREE_TOKEN_CAP: usize = 800;

/// The collaborators one strategy invocation may draw from
pub struct Sources {
    pub graph: GraphGatherer,
    pub files: FilesGatherer,
    pub vcs: VcsGatherer,

    /// Outcome of the builder's readiness probe; graph-backed steps are
    /// skipped when false
    pub graph_ready: bool,
}

/// A task-type-specific ordered fill of the budget
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn build(
        &self,
        req: &ContextBuildRequest,
        budget: &mut BudgetAllocation,
        sources: &Sources,
    ) -> StrategyResult;
}

/// Strategy instance for a task type
pub fn for_task_type(task_type: TaskType) -> Box<dyn Strategy> {
    match task_type {
        TaskType::Review => Box::new(ReviewStrategy),
        TaskType::Implementation => Box::new(ImplementationStrategy),
        TaskType::Exploration => Box::new(ExplorationStrategy),
        TaskType::PlanReview => Box::new(PlanReviewStrategy),
        TaskType::Planning => Box::new(PlanningStrategy),
        TaskType::Question => Box::new(QuestionStrategy),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use super::*;
    use crate::graph::mock::StaticGraph;

    /// Sources over a temp dir and a static graph
    pub fn sources(graph: StaticGraph, root: &std::path::Path) -> Sources {
        Sources {
            graph: GraphGatherer::new(Arc::new(graph)),
            files: FilesGatherer::new(root),
            vcs: VcsGatherer::new(root),
            graph_ready: true,
        }
    }
}
