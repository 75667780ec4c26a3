//! Planning strategy
//!
//! Priority order: current plan content (revisions), project file tree,
//! codebase summary, architecture docs (graph first, filesystem
//! fallback), existing spec/plan entities, relevant code patterns, then
//! requested files. Emits questions when the gathered context looks
//! insufficient for planning.

use async_trait::async_trait;
use tracing::debug;

use crate::budget::{BudgetAllocation, TokenEstimator};
use crate::domain::{ContextBuildRequest, Question, StrategyResult, Urgency, keys};

use super::{FILE_TREE_TOKEN_CAP, MIN_TOKENS_FOR_DOCS, MIN_TOKENS_FOR_PATTERNS, Sources, Strategy};

const SPEC_PREDICATE: &str = "doc.spec";
const PLAN_PREDICATE: &str = "doc.plan";

pub struct PlanningStrategy;

#[async_trait]
impl Strategy for PlanningStrategy {
    async fn build(
        &self,
        req: &ContextBuildRequest,
        budget: &mut BudgetAllocation,
        sources: &Sources,
    ) -> StrategyResult {
        let mut result = StrategyResult::default();
        let estimator = TokenEstimator::new();

        // 0. Current plan content, present only for revisions.
        if !req.plan_content.is_empty() {
            let (content, clipped) = estimator.truncate_to_tokens(&req.plan_content, budget.remaining());
            if clipped {
                result.truncated = true;
            }
            let tokens = estimator.estimate(&content);
            if tokens > 0 && budget.allocate("plan_content", tokens).is_ok() {
                result.documents.insert(keys::PLAN.to_string(), content);
            }
        }

        // 1. Project file tree, hard-capped, with a path discipline note.
        // Scope patterns narrow the listing when the request carries any.
        let mut tree = sources.files.file_tree();
        if !req.scope_patterns.is_empty() {
            let patterns: Vec<glob::Pattern> = req
                .scope_patterns
                .iter()
                .filter_map(|p| glob::Pattern::new(p).ok())
                .collect();
            if !patterns.is_empty() {
                tree.retain(|path| patterns.iter().any(|p| p.matches(path)));
            }
        }
        if !tree.is_empty() {
            let rendered = format!(
                "Project file tree. Use ONLY these paths; do not invent others.\n{}",
                tree.join("\n")
            );
            let cap = FILE_TREE_TOKEN_CAP.min(budget.remaining());
            let (content, clipped) = estimator.truncate_to_tokens(&rendered, cap);
            if clipped {
                result.truncated = true;
            }
            let tokens = estimator.estimate(&content);
            if tokens > 0 && budget.allocate("file_tree", tokens).is_ok() {
                result.documents.insert(keys::FILE_TREE.to_string(), content);
            }
        }

        // 2. Codebase summary; skipped when the graph is not ready.
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

        // 3. Architecture docs: graph-scoped first, filesystem fallback.
        let mut arch_docs = 0;
        if sources.graph_ready {
            for id in sources.graph.planning_architecture_docs().await {
                if budget.remaining() < MIN_TOKENS_FOR_DOCS {
                    break;
                }
                let Ok(content) = sources.graph.hydrate(&id, 1).await else {
                    debug!(entity = %id, "architecture doc hydration failed, skipping");
                    continue;
                };
                let tokens = estimator.estimate(&content);
                if budget.can_fit(tokens) && budget.allocate(&format!("arch:{id}"), tokens).is_ok() {
                    result.documents.insert(keys::entity(&id), content);
                    result.entities.push(id);
                    arch_docs += 1;
                }
            }
        }
        if arch_docs == 0 {
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
                    arch_docs += 1;
                }
            }
        }

        // 4. Existing spec and plan entities.
        let mut spec_entities = 0;
        if sources.graph_ready {
            for predicate in [SPEC_PREDICATE, PLAN_PREDICATE] {
                for id in sources.graph.query(predicate).await {
                    if budget.remaining() < MIN_TOKENS_FOR_DOCS {
                        break;
                    }
                    let Ok(content) = sources.graph.hydrate(&id, 1).await else {
                        continue;
                    };
                    let tokens = estimator.estimate(&content);
                    if budget.can_fit(tokens) && budget.allocate(&format!("entity:{id}"), tokens).is_ok() {
                        result.documents.insert(keys::entity(&id), content);
                        result.entities.push(id);
                        spec_entities += 1;
                    }
                }
            }
        }

        // 5. Code patterns matching the topic.
        let mut patterns = 0;
        if !req.topic.is_empty() && sources.graph_ready && budget.remaining() >= MIN_TOKENS_FOR_PATTERNS {
            for id in sources.graph.related_patterns(&req.topic).await {
                let Ok(content) = sources.graph.hydrate(&id, 1).await else {
                    continue;
                };
                let tokens = estimator.estimate(&content);
                if budget.can_fit(tokens) && budget.allocate(&format!("pattern:{id}"), tokens).is_ok() {
                    result.documents.insert(keys::pattern(&id), content);
                    result.entities.push(id);
                    patterns += 1;
                }
            }
        }

        // 6. Requested files.
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

        // Question emission.
        if arch_docs == 0 && spec_entities == 0 {
            result.push_question(Question::new(
                "architecture.context",
                "No architecture documentation or existing specs were found. What are the \
                 architectural constraints this plan must respect?",
                "Planning context came up empty on architecture sources",
                Urgency::High,
            ));
        }
        if !req.topic.is_empty() && patterns == 0 && spec_entities == 0 {
            result.push_question(Question::new(
                "architecture.patterns",
                format!("No code patterns match the topic '{}'. Are there existing conventions to follow?", req.topic),
                "Topic matched no indexed patterns",
                Urgency::Normal,
            ));
        }
        if req.topic.is_empty() && req.files.is_empty() && req.spec_entity_id.is_empty() {
            result.push_question(Question::new(
                "requirements.scope",
                "The planning request names no topic, files, or spec. What is in scope?",
                "Scope is entirely ambiguous",
                Urgency::Blocking,
            ));
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
    use std::fs;
    use tempfile::tempdir;

    fn planning_request() -> ContextBuildRequest {
        ContextBuildRequest {
            request_id: "r-plan".into(),
            task_type: TaskType::Planning,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ambiguous_scope_emits_blocking_question() {
        let dir = tempdir().unwrap();
        let srcs = sources(StaticGraph::new(), dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let result = PlanningStrategy.build(&planning_request(), &mut budget, &srcs).await;

        let scope = result.questions.iter().find(|q| q.topic == "requirements.scope").unwrap();
        assert_eq!(scope.urgency, Urgency::Blocking);
        assert!(result.insufficient_context);
    }

    #[tokio::test]
    async fn test_file_tree_capped_and_flagged() {
        let dir = tempdir().unwrap();
        for i in 0..200 {
            fs::write(dir.path().join(format!("file-with-a-long-name-{i}.rs")), "x").unwrap();
        }
        let srcs = sources(StaticGraph::new(), dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let result = PlanningStrategy.build(&planning_request(), &mut budget, &srcs).await;

        let tree = result.documents.get(keys::FILE_TREE).unwrap();
        assert!(tree.starts_with("Project file tree. Use ONLY these paths"));
        assert!(budget.get("file_tree").unwrap() <= FILE_TREE_TOKEN_CAP);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_graph_sources_when_ready() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("lib.rs"), "fn main() {}").unwrap();
        let graph = StaticGraph::new()
            .with_summary("A small service with two modules")
            .with_predicate("doc.architecture", &["doc.arch"])
            .with_entity("doc.arch", "layered architecture")
            .with_predicate("doc.spec", &["spec.auth"])
            .with_entity("spec.auth", "auth spec body");
        let srcs = sources(graph, dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let mut req = planning_request();
        req.topic = "auth".into();

        let result = PlanningStrategy.build(&req, &mut budget, &srcs).await;

        assert!(result.documents.contains_key(keys::SUMMARY));
        assert!(result.documents.contains_key("__entity__doc.arch"));
        assert!(result.documents.contains_key("__entity__spec.auth"));
        // Specs and architecture docs exist, so no questions fire.
        assert!(result.questions.is_empty());
        assert!(!result.insufficient_context);
    }

    #[tokio::test]
    async fn test_graph_not_ready_skips_graph_sources() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "# arch notes").unwrap();
        let graph = StaticGraph::new().with_summary("should not appear");
        let mut srcs = sources(graph, dir.path());
        srcs.graph_ready = false;
        let mut budget = BudgetAllocation::new(8000);

        let mut req = planning_request();
        req.topic = "auth".into();

        let result = PlanningStrategy.build(&req, &mut budget, &srcs).await;

        assert!(!result.documents.contains_key(keys::SUMMARY));
        // Filesystem fallback still supplies architecture docs.
        assert!(result.documents.contains_key("README.md"));
    }

    #[tokio::test]
    async fn test_scope_patterns_narrow_file_tree() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("src/auth.rs"), "x").unwrap();
        fs::write(dir.path().join("docs/notes.md"), "x").unwrap();

        let srcs = sources(StaticGraph::new(), dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let mut req = planning_request();
        req.topic = "auth".into();
        req.scope_patterns = vec!["src/**".into()];

        let result = PlanningStrategy.build(&req, &mut budget, &srcs).await;

        let tree = result.documents.get(keys::FILE_TREE).unwrap();
        assert!(tree.contains("src/auth.rs"));
        assert!(!tree.contains("docs/notes.md"));
    }

    #[tokio::test]
    async fn test_plan_revision_includes_plan_content() {
        let dir = tempdir().unwrap();
        let srcs = sources(StaticGraph::new(), dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let mut req = planning_request();
        req.plan_content = "## Existing plan\nstep one".into();
        req.topic = "auth".into();

        let result = PlanningStrategy.build(&req, &mut budget, &srcs).await;

        assert_eq!(result.documents.get(keys::PLAN).unwrap(), "## Existing plan\nstep one");
        assert_eq!(budget.order()[0], "plan_content");
    }
}
