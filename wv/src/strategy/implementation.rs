//! Implementation strategy
//!
//! Priority order: spec entity hydration (required, all-or-nothing),
//! requested source files (truncate), related pattern entities matching
//! the topic, then architecture docs.

use async_trait::async_trait;
use tracing::debug;

use crate::budget::{BudgetAllocation, TokenEstimator};
use crate::domain::{ContextBuildRequest, StrategyResult, keys};

use super::{MIN_TOKENS_FOR_DOCS, MIN_TOKENS_FOR_PATTERNS, Sources, Strategy};

pub struct ImplementationStrategy;

#[async_trait]
impl Strategy for ImplementationStrategy {
    async fn build(
        &self,
        req: &ContextBuildRequest,
        budget: &mut BudgetAllocation,
        sources: &Sources,
    ) -> StrategyResult {
        let mut result = StrategyResult::default();
        let estimator = TokenEstimator::new();

        // 1. The spec being implemented. Required; no partial inclusion.
        if req.spec_entity_id.is_empty() {
            return StrategyResult::failed("implementation context requires a spec entity id");
        }
        let spec_content = match sources.graph.hydrate(&req.spec_entity_id, 2).await {
            Ok(content) => content,
            Err(e) => {
                return StrategyResult::failed(format!("spec entity {} unavailable: {e}", req.spec_entity_id));
            }
        };
        let spec_tokens = estimator.estimate(&spec_content);
        if budget.allocate("spec", spec_tokens).is_err() {
            return StrategyResult::failed(format!(
                "spec entity {} needs {spec_tokens} tokens but only {} remain",
                req.spec_entity_id,
                budget.remaining()
            ));
        }
        result.entities.push(req.spec_entity_id.clone());
        result.documents.insert(keys::spec(&req.spec_entity_id), spec_content);

        // 2. Requested source files, truncated to fit.
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
            let _ = budget.allocate("source_files", file_tokens);
            result.documents.insert(path.clone(), content);
        }

        // 3. Pattern entities matching the topic.
        if !req.topic.is_empty() && budget.remaining() >= MIN_TOKENS_FOR_PATTERNS {
            for id in sources.graph.related_patterns(&req.topic).await {
                let Ok(content) = sources.graph.hydrate(&id, 1).await else {
                    debug!(entity = %id, "pattern hydration failed, skipping");
                    continue;
                };
                let tokens = estimator.estimate(&content);
                if !budget.can_fit(tokens) {
                    continue;
                }
                if budget.allocate(&format!("pattern:{id}"), tokens).is_ok() {
                    result.documents.insert(keys::pattern(&id), content);
                    result.entities.push(id);
                }
            }
        }

        // 4. Architecture docs.
        if budget.remaining() >= MIN_TOKENS_FOR_DOCS {
            for (path, content) in sources.files.fallback_arch_docs().await {
                let available = budget.remaining();
                if available < MIN_TOKENS_FOR_DOCS {
                    break;
                }
                let (content, clipped) = estimator.truncate_to_tokens(&content, available);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;
    use crate::graph::mock::StaticGraph;
    use crate::strategy::testutil::sources;
    use tempfile::tempdir;

    fn request(spec: &str, topic: &str) -> ContextBuildRequest {
        ContextBuildRequest {
            request_id: "r-impl".into(),
            task_type: TaskType::Implementation,
            spec_entity_id: spec.into(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_spec_is_error() {
        let dir = tempdir().unwrap();
        let srcs = sources(StaticGraph::new(), dir.path());
        let mut budget = BudgetAllocation::new(4000);

        let result = ImplementationStrategy
            .build(&request("spec.X", ""), &mut budget, &srcs)
            .await;
        assert!(!result.error.is_empty());
        assert!(result.documents.is_empty());
        assert_eq!(budget.allocated(), 0);
    }

    #[tokio::test]
    async fn test_spec_all_or_nothing_over_budget() {
        let dir = tempdir().unwrap();
        let graph = StaticGraph::new().with_entity("spec.big", &"x".repeat(40_000));
        let srcs = sources(graph, dir.path());
        let mut budget = BudgetAllocation::new(4000);

        let result = ImplementationStrategy
            .build(&request("spec.big", ""), &mut budget, &srcs)
            .await;
        assert!(result.error.contains("tokens"));
        assert!(!result.truncated);
        assert_eq!(budget.allocated(), 0);
    }

    #[tokio::test]
    async fn test_spec_and_patterns_included() {
        let dir = tempdir().unwrap();
        let graph = StaticGraph::new()
            .with_entity("spec.auth", "## Auth spec\nimplement login")
            .with_entity("auth.session", "fn session() {}")
            .with_predicate("code.function", &["auth.session", "billing.charge"]);
        let srcs = sources(graph, dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let result = ImplementationStrategy
            .build(&request("spec.auth", "auth"), &mut budget, &srcs)
            .await;
        assert!(result.error.is_empty());
        assert!(result.documents.contains_key("__spec__spec.auth"));
        assert!(result.documents.contains_key("__pattern__auth.session"));
        assert_eq!(result.entities, vec!["spec.auth", "auth.session"]);
        assert_eq!(budget.order()[0], "spec");
    }
}
