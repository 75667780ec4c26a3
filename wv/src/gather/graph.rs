//! Knowledge graph gatherer

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::graph::{GraphError, KnowledgeGraph};

/// Per-query deadline
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-hydration deadline
const HYDRATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Predicates scanned for code patterns matching a topic
pub const PATTERN_PREDICATES: [&str; 4] = ["code.function", "code.type", "code.interface", "code.package"];

/// Cap on pattern entities taken from any single predicate
pub const MAX_ENTITIES_PER_TYPE: usize = 3;

/// Global cap on pattern entities per request
pub const MAX_RELATED_PATTERNS: usize = 10;

const ARCHITECTURE_PREDICATE: &str = "doc.architecture";
const SCOPED_PREDICATE: &str = "doc.scoped";
const SCOPE_PLAN_PREDICATE: &str = "doc.scope.plan";
const SCOPE_ALL_PREDICATE: &str = "doc.scope.all";

/// Read-side adapter over the knowledge graph with per-call timeouts
pub struct GraphGatherer {
    graph: Arc<dyn KnowledgeGraph>,
}

impl GraphGatherer {
    pub fn new(graph: Arc<dyn KnowledgeGraph>) -> Self {
        Self { graph }
    }

    /// Entity ids for a predicate; a timeout degrades to empty
    pub async fn query(&self, predicate: &str) -> Vec<String> {
        match tokio::time::timeout(QUERY_TIMEOUT, self.graph.query_by_predicate(predicate)).await {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                warn!(predicate, error = %e, "graph query failed");
                Vec::new()
            }
            Err(_) => {
                warn!(predicate, "graph query timed out");
                Vec::new()
            }
        }
    }

    /// Hydrate one entity under the per-hydrate deadline
    pub async fn hydrate(&self, entity_id: &str, depth: u32) -> Result<String, GraphError> {
        match tokio::time::timeout(HYDRATE_TIMEOUT, self.graph.hydrate(entity_id, depth)).await {
            Ok(result) => result,
            Err(_) => Err(GraphError::Timeout(HYDRATE_TIMEOUT)),
        }
    }

    /// Codebase summary; a timeout or error degrades to `None`
    pub async fn summary(&self) -> Option<String> {
        match tokio::time::timeout(QUERY_TIMEOUT, self.graph.codebase_summary()).await {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                debug!(error = %e, "codebase summary unavailable");
                None
            }
            Err(_) => {
                warn!("codebase summary timed out");
                None
            }
        }
    }

    /// Pattern entity ids whose id mentions the topic
    ///
    /// Client-side substring filter over the pattern predicates, capped
    /// per predicate and globally.
    pub async fn related_patterns(&self, topic: &str) -> Vec<String> {
        let needle = topic.to_lowercase();
        let mut out = Vec::new();

        for predicate in PATTERN_PREDICATES {
            let ids = self.query(predicate).await;
            let mut taken = 0;
            for id in ids {
                if out.len() >= MAX_RELATED_PATTERNS {
                    return out;
                }
                if taken >= MAX_ENTITIES_PER_TYPE {
                    break;
                }
                if id.to_lowercase().contains(&needle) {
                    out.push(id);
                    taken += 1;
                }
            }
        }

        out
    }

    /// Architecture doc entities usable for planning
    ///
    /// Keeps docs scoped `plan` or `all`, and docs carrying no scope tag
    /// at all.
    pub async fn planning_architecture_docs(&self) -> Vec<String> {
        let arch = self.query(ARCHITECTURE_PREDICATE).await;
        if arch.is_empty() {
            return arch;
        }

        let classified: HashSet<String> = self.query(SCOPED_PREDICATE).await.into_iter().collect();
        let mut wanted: HashSet<String> = self.query(SCOPE_PLAN_PREDICATE).await.into_iter().collect();
        wanted.extend(self.query(SCOPE_ALL_PREDICATE).await);

        arch.into_iter()
            .filter(|id| wanted.contains(id) || !classified.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mock::StaticGraph;

    #[tokio::test]
    async fn test_related_patterns_caps_per_type() {
        let graph = StaticGraph::new()
            .with_predicate(
                "code.function",
                &["auth.login", "auth.logout", "auth.refresh", "auth.revoke"],
            )
            .with_predicate("code.type", &["auth.Token"]);
        let gatherer = GraphGatherer::new(Arc::new(graph));

        let patterns = gatherer.related_patterns("auth").await;
        // Three from code.function (per-type cap), one from code.type.
        assert_eq!(patterns.len(), 4);
        assert!(patterns.contains(&"auth.Token".to_string()));
        assert!(!patterns.contains(&"auth.revoke".to_string()));
    }

    #[tokio::test]
    async fn test_related_patterns_filters_by_topic() {
        let graph = StaticGraph::new().with_predicate("code.function", &["auth.login", "billing.charge"]);
        let gatherer = GraphGatherer::new(Arc::new(graph));

        let patterns = gatherer.related_patterns("billing").await;
        assert_eq!(patterns, vec!["billing.charge".to_string()]);
    }

    #[tokio::test]
    async fn test_planning_docs_scope_filter() {
        let graph = StaticGraph::new()
            .with_predicate("doc.architecture", &["doc.a", "doc.b", "doc.c", "doc.d"])
            .with_predicate("doc.scoped", &["doc.a", "doc.b", "doc.c"])
            .with_predicate("doc.scope.plan", &["doc.a"])
            .with_predicate("doc.scope.all", &["doc.b"]);
        let gatherer = GraphGatherer::new(Arc::new(graph));

        let docs = gatherer.planning_architecture_docs().await;
        // doc.c is scoped to something else; doc.d is unclassified.
        assert_eq!(docs, vec!["doc.a", "doc.b", "doc.d"]);
    }

    #[tokio::test]
    async fn test_query_error_degrades_to_empty() {
        let gatherer = GraphGatherer::new(Arc::new(StaticGraph::new()));
        assert!(gatherer.query("no.such.predicate").await.is_empty());
    }
}
