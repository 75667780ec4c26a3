//! Review strategy
//!
//! Priority order: changed-files domain inference, git diff (truncated at
//! file boundaries), related test files (partial last file allowed), then
//! convention files (whole-file only).

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::budget::{BudgetAllocation, TokenEstimator};
use crate::domain::{ContextBuildRequest, StrategyResult};
use crate::gather::{CONVENTION_FILES, truncate_diff_at_file_boundaries};

use super::{
    MIN_TOKENS_FOR_CONVENTIONS, MIN_TOKENS_FOR_PARTIAL, MIN_TOKENS_FOR_TESTS, Sources, Strategy,
};

pub struct ReviewStrategy;

#[async_trait]
impl Strategy for ReviewStrategy {
    async fn build(
        &self,
        req: &ContextBuildRequest,
        budget: &mut BudgetAllocation,
        sources: &Sources,
    ) -> StrategyResult {
        let mut result = StrategyResult::default();
        let estimator = TokenEstimator::new();

        // 1. Changed files, from the request or from version control.
        let changed = if !req.files.is_empty() {
            req.files.clone()
        } else {
            match sources.vcs.changed_files(&req.git_ref).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(git_ref = %req.git_ref, error = %e, "changed-file lookup failed");
                    Vec::new()
                }
            }
        };
        result.domains = infer_domains(&changed);

        // 2. Git diff, clipped on file boundaries.
        if !req.git_ref.is_empty() {
            match sources.vcs.diff(&req.git_ref).await {
                Ok(diff) if !diff.is_empty() => {
                    let (kept, clipped) = truncate_diff_at_file_boundaries(&diff, budget.remaining());
                    if clipped {
                        result.truncated = true;
                    }
                    if !kept.is_empty() {
                        let tokens = estimator.estimate(&kept);
                        if budget.allocate("git_diff", tokens).is_ok() {
                            result.diffs.push(kept);
                        }
                    }
                }
                Ok(_) => debug!(git_ref = %req.git_ref, "empty diff"),
                Err(e) => {
                    // The diff is the essence of a review; without files
                    // to fall back on there is nothing to review.
                    if changed.is_empty() {
                        return StrategyResult::failed(format!("failed to collect diff for {}: {e}", req.git_ref));
                    }
                    warn!(git_ref = %req.git_ref, error = %e, "diff collection failed, reviewing files only");
                }
            }
        }

        // 3. Related test files; as many as fit, partial last file allowed.
        if budget.remaining() >= MIN_TOKENS_FOR_TESTS {
            let mut test_tokens = 0;
            for test_path in sources.files.related_tests(&changed) {
                let Some(content) = sources.files.read(&test_path).await else {
                    continue;
                };
                let tokens = estimator.estimate(&content);
                let available = budget.remaining();
                if tokens <= available {
                    test_tokens += tokens;
                    // Fits by construction: tokens <= remaining.
                    let _ = budget.allocate("tests", test_tokens);
                    result.documents.insert(test_path, content);
                } else if available >= MIN_TOKENS_FOR_PARTIAL {
                    let (clipped, _) = estimator.truncate_to_tokens(&content, available);
                    test_tokens += estimator.estimate(&clipped);
                    let _ = budget.allocate("tests", test_tokens);
                    result.documents.insert(test_path, clipped);
                    result.truncated = true;
                    break;
                } else {
                    break;
                }
            }
        }

        // 4. Convention files; whole-file only.
        if budget.remaining() >= MIN_TOKENS_FOR_CONVENTIONS {
            for convention in CONVENTION_FILES {
                let Some(content) = sources.files.read(convention).await else {
                    continue;
                };
                let tokens = estimator.estimate(&content);
                if budget.can_fit(tokens) && budget.allocate(&format!("convention:{convention}"), tokens).is_ok() {
                    result.documents.insert(convention.to_string(), content);
                }
            }
        }

        result
    }
}

/// Problem domains inferred from changed file paths
///
/// The leading path segment names the domain; files at the repo root fall
/// under "root". First-seen order, no duplicates.
fn infer_domains(changed: &[String]) -> Vec<String> {
    let mut domains = Vec::new();
    for file in changed {
        let domain = match file.split('/').next() {
            Some(first) if file.contains('/') => first.to_string(),
            _ => "root".to_string(),
        };
        if !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    domains
}
