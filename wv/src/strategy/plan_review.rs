//! Plan-review strategy
//!
//! Priority order: the plan under review (essential, truncate if needed),
//! the project file tree with greenfield detection, then architecture
//! docs. Standards ride in separately as the preamble; their rule texts
//! surface through `sop_requirements` without touching this budget.

use async_trait::async_trait;

use crate::budget::{BudgetAllocation, TokenEstimator};
use crate::domain::{ContextBuildRequest, StrategyResult, keys};

use super::{MIN_TOKENS_FOR_DOCS, PLAN_REVIEW_FILE_TREE_TOKEN_CAP, Sources, Strategy};

/// Banner emitted when the workspace has no user-authored files
const GREENFIELD_BANNER: &str = "GREENFIELD PROJECT: this workspace has no source files yet. \
     Paths named in the plan's scope are intended future files; do NOT flag them as hallucinated.";

/// Banner emitted for established projects
const VALIDATION_BANNER: &str = "Validate the plan's scope paths against this file tree. \
     Paths outside it that are not clearly new files should be flagged.";

pub struct PlanReviewStrategy;

#[async_trait]
impl Strategy for PlanReviewStrategy {
    async fn build(
        &self,
        req: &ContextBuildRequest,
        budget: &mut BudgetAllocation,
        sources: &Sources,
    ) -> StrategyResult {
        let mut result = StrategyResult::default();
        let estimator = TokenEstimator::new();

        // 1. The plan itself. Without it there is nothing to review.
        if req.plan_content.is_empty() {
            return StrategyResult::failed("plan-review context requires plan content");
        }
        let (plan, clipped) = estimator.truncate_to_tokens(&req.plan_content, budget.remaining());
        if clipped {
            result.truncated = true;
        }
        let tokens = estimator.estimate(&plan);
        if tokens == 0 || budget.allocate("plan_content", tokens).is_err() {
            return StrategyResult::failed("no budget left for plan content");
        }
        result.documents.insert(keys::PLAN.to_string(), plan);

        // 2. File tree with greenfield detection.
        let tree = sources.files.file_tree();
        let user_files: Vec<&String> = tree
            .iter()
            .filter(|path| !is_dotfile(path) && !path.starts_with("sources/"))
            .collect();

        let rendered = if user_files.is_empty() {
            format!("{GREENFIELD_BANNER}\n")
        } else {
            let listing = user_files.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n");
            format!("{VALIDATION_BANNER}\n{listing}")
        };

        let cap = PLAN_REVIEW_FILE_TREE_TOKEN_CAP.min(budget.remaining());
        let (content, clipped) = estimator.truncate_to_tokens(&rendered, cap);
        if clipped {
            result.truncated = true;
        }
        let tokens = estimator.estimate(&content);
        if tokens > 0 && budget.allocate("file_tree", tokens).is_ok() {
            result.documents.insert(keys::FILE_TREE.to_string(), content);
        }

        // 3. Architecture docs.
        if budget.remaining() >= MIN_TOKENS_FOR_DOCS {
            for (path, content) in sources.files.fallback_arch_docs().await {
                if budget.remaining() < MIN_TOKENS_FOR_DOCS {
                    break;
                }
                let (content, clipped) = estimator.truncate_to_tokens(&content, budget.remaining());
                if clipped {
                    result.truncated = true;
                }
                let tokens = estimator.estimate(&content);
                if tokens > 0 && budget.allocate(&format!("arch:{path}"), tokens).is_ok() {
                    result.documents.insert(path, content);
                }
            }
        }

        result
    }
}

/// Whether any path component is dot-prefixed
fn is_dotfile(path: &str) -> bool {
    path.split('/').any(|part| part.starts_with('.'))
}
