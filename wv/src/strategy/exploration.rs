//! Exploration strategy
//!
//! Priority order: codebase summary, entities matching the topic, related
//! docs, then requested files. Everything degrades gracefully; an
//! exploration with nothing found is still a valid (empty) context.

use async_trait::async_trait;

use crate::budget::{BudgetAllocation, TokenEstimator};
use crate::domain::{ContextBuildRequest, StrategyResult, keys};

use super::{MIN_TOKENS_FOR_DOCS, Sources, Strategy};

pub struct ExplorationStrategy;

#[async_trait]
impl Strategy for ExplorationStrategy {
    async fn build(
        &self,
        req: &ContextBuildRequest,
        budget: &mut BudgetAllocation,
        sources: &Sources,
    ) -> StrategyResult {
        let mut result = StrategyResult::default();
        let estimator = TokenEstimator::new();

        // 1. Codebase summary.
        if sources.graph_ready
            && let Some(summary) = sources.graph.summary().await
        {
            let (content, clipped) = estimator.truncate_to_tokens(&summary, budget.remaining());
            if clipped {
                result.truncated = true;
            }
            let tokens = estimator.estimate(&content);
            if tokens > 0 && budget.allocate("codebase_summary", tokens).is_ok() {
                result.documents.insert(keys::SUMMARY.to_string(), content);
            }
        }

        // 2. Entities matching the topic.
        if !req.topic.is_empty() && sources.graph_ready {
            for id in sources.graph.related_patterns(&req.topic).await {
                let Ok(content) = sources.graph.hydrate(&id, 1).await else {
                    continue;
                };
                let tokens = estimator.estimate(&content);
                if budget.can_fit(tokens) && budget.allocate(&format!("entity:{id}"), tokens).is_ok() {
                    result.documents.insert(keys::entity(&id), content);
                    result.entities.push(id);
                }
            }
        }

        // 3. Related docs.
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
                if tokens > 0 && budget.allocate(&format!("doc:{path}"), tokens).is_ok() {
                    result.documents.insert(path, content);
                }
            }
        }

        // 4. Requested files.
        let mut file_tokens = 0;
        for path in &req.files {
            let Some(content) = sources.files.read(path).await else {
                continue;
            };
            let available = budget.remaining();
            if available == 0 {
                break;
            }
            let (content, clipped) = estimator.truncate_to_tokens(&content, available);
            if clipped {
                result.truncated = true;
            }
            if content.is_empty() {
                continue;
            }
            file_tokens += estimator.estimate(&content);
            let _ = budget.allocate("requested_files", file_tokens);
            result.documents.insert(path.clone(), content);
        }

        result
    }
}
