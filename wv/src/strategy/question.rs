//! Question-answering strategy
//!
//! Priority order: entities matching the topic keywords, source documents
//! whose paths match, the codebase summary, relevance-filtered docs, then
//! requested files. An empty topic or an empty match set escalates to
//! questions of its own.

use async_trait::async_trait;

use crate::budget::{BudgetAllocation, TokenEstimator};
use crate::domain::{ContextBuildRequest, Question, StrategyResult, Urgency, keys};
use crate::gather::PATTERN_PREDICATES;

use super::{MIN_TOKENS_FOR_DOCS, Sources, Strategy, extract_keywords};

const DOC_PREDICATES: [&str; 2] = ["doc.architecture", "doc.spec"];

pub struct QuestionStrategy;

#[async_trait]
impl Strategy for QuestionStrategy {
    async fn build(
        &self,
        req: &ContextBuildRequest,
        budget: &mut BudgetAllocation,
        sources: &Sources,
    ) -> StrategyResult {
        let mut result = StrategyResult::default();
        let estimator = TokenEstimator::new();

        if req.topic.is_empty() {
            result.push_question(Question::new(
                "requirements.clarification",
                "The question has no topic. What exactly is being asked?",
                "Question requests need a topic to search on",
                Urgency::Blocking,
            ));
            return result;
        }

        let keywords = extract_keywords(&req.topic);
        let mut matched_anything = false;

        // 1. Entities whose ids mention a keyword.
        if sources.graph_ready {
            for predicate in PATTERN_PREDICATES.iter().chain(DOC_PREDICATES.iter()) {
                for id in sources.graph.query(predicate).await {
                    let lower = id.to_lowercase();
                    if !keywords.iter().any(|k| lower.contains(k.as_str())) {
                        continue;
                    }
                    let Ok(content) = sources.graph.hydrate(&id, 1).await else {
                        continue;
                    };
                    let tokens = estimator.estimate(&content);
                    if budget.can_fit(tokens) && budget.allocate(&format!("entity:{id}"), tokens).is_ok() {
                        result.documents.insert(keys::entity(&id), content);
                        result.entities.push(id);
                        matched_anything = true;
                    }
                }
            }
        }

        // 2. Source documents whose paths mention a keyword.
        for path in sources.files.file_tree() {
            let lower = path.to_lowercase();
            if !keywords.iter().any(|k| lower.contains(k.as_str())) {
                continue;
            }
            let Some(content) = sources.files.read(&path).await else {
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
            let tokens = estimator.estimate(&content);
            if tokens > 0 && budget.allocate(&format!("doc:{path}"), tokens).is_ok() {
                result.documents.insert(path, content);
                matched_anything = true;
            }
        }

        // 3. Codebase summary.
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

        // 4. Docs whose content matches at least half the keywords.
        let relevance_floor = keywords.len().div_ceil(2);
        if budget.remaining() >= MIN_TOKENS_FOR_DOCS {
            for (path, content) in sources.files.fallback_arch_docs().await {
                if result.documents.contains_key(&path) {
                    continue;
                }
                let lower = content.to_lowercase();
                let hits = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
                if hits < relevance_floor {
                    continue;
                }
                let (content, clipped) = estimator.truncate_to_tokens(&content, budget.remaining());
                if clipped {
                    result.truncated = true;
                }
                let tokens = estimator.estimate(&content);
                if tokens > 0 && budget.allocate(&format!("doc:{path}"), tokens).is_ok() {
                    result.documents.insert(path, content);
                    matched_anything = true;
                }
            }
        }

        // 5. Requested files.
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

        if !matched_anything {
            let category = keywords.first().cloned().unwrap_or_else(|| "general".to_string());
            result.push_question(Question::new(
                format!("knowledge.{category}"),
                format!("Nothing in the codebase or graph matches '{}'. Where should the answer come from?", req.topic),
                "Keyword search found no matching sources",
                Urgency::High,
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

    fn question_request(topic: &str) -> ContextBuildRequest {
        ContextBuildRequest {
            request_id: "r-q".into(),
            task_type: TaskType::Question,
            topic: topic.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_topic_blocks() {
        let dir = tempdir().unwrap();
        let srcs = sources(StaticGraph::new(), dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let result = QuestionStrategy.build(&question_request(""), &mut budget, &srcs).await;

        assert_eq!(result.questions.len(), 1);
        assert_eq!(result.questions[0].topic, "requirements.clarification");
        assert_eq!(result.questions[0].urgency, Urgency::Blocking);
        assert!(result.insufficient_context);
    }

    #[tokio::test]
    async fn test_keyword_matches_collect_sources() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/oauth.rs"), "fn refresh_token() {}").unwrap();

        let graph = StaticGraph::new()
            .with_predicate("code.function", &["oauth.refresh"])
            .with_entity("oauth.refresh", "fn refresh() {}");
        let srcs = sources(graph, dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let result = QuestionStrategy
            .build(&question_request("How does the oauth refresh flow work?"), &mut budget, &srcs)
            .await;

        assert!(result.documents.contains_key("__entity__oauth.refresh"));
        assert!(result.documents.contains_key("src/oauth.rs"));
        assert!(result.questions.is_empty());
    }

    #[tokio::test]
    async fn test_no_match_emits_knowledge_question() {
        let dir = tempdir().unwrap();
        let srcs = sources(StaticGraph::new(), dir.path());
        let mut budget = BudgetAllocation::new(8000);

        let result = QuestionStrategy
            .build(&question_request("kubernetes ingress settings"), &mut budget, &srcs)
            .await;

        assert_eq!(result.questions.len(), 1);
        assert_eq!(result.questions[0].topic, "knowledge.kubernetes");
        assert_eq!(result.questions[0].urgency, Urgency::High);
        assert!(result.insufficient_context);
    }
}
