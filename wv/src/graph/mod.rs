//! Knowledge graph gateway
//!
//! The graph is an external collaborator; strategies only see this trait.
//! `readiness` gates graph-dependent steps behind a first-use warmup probe.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod readiness;

pub use readiness::GraphReadiness;

/// Errors from graph operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("graph not ready after {0:?}")]
    NotReady(Duration),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("graph unavailable: {0}")]
    Unavailable(String),
}

impl GraphError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::NotFound(_) => false,
            GraphError::NotReady(_) => true,
            GraphError::Timeout(_) => true,
            GraphError::Unavailable(_) => true,
        }
    }
}

/// Entity and triple queries against the knowledge graph
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Entity ids carrying the given predicate
    async fn query_by_predicate(&self, predicate: &str) -> Result<Vec<String>, GraphError>;

    /// Rendered content of an entity, expanded to `depth` hops
    async fn hydrate(&self, entity_id: &str, depth: u32) -> Result<String, GraphError>;

    /// High-level summary of the indexed codebase
    async fn codebase_summary(&self) -> Result<String, GraphError>;

    /// Block until the graph can serve queries, or the deadline passes
    async fn wait_for_ready(&self, deadline: Duration) -> Result<(), GraphError>;
}

pub mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Table-backed graph for tests
    pub struct StaticGraph {
        predicates: Mutex<HashMap<String, Vec<String>>>,
        entities: Mutex<HashMap<String, String>>,
        summary: Mutex<String>,
        ready: Mutex<bool>,
    }

    impl StaticGraph {
        pub fn new() -> Self {
            Self {
                predicates: Mutex::new(HashMap::new()),
                entities: Mutex::new(HashMap::new()),
                summary: Mutex::new(String::new()),
                ready: Mutex::new(true),
            }
        }

        pub fn with_entity(self, id: &str, content: &str) -> Self {
            self.entities.lock().unwrap().insert(id.to_string(), content.to_string());
            self
        }

        pub fn with_predicate(self, predicate: &str, ids: &[&str]) -> Self {
            self.predicates
                .lock()
                .unwrap()
                .insert(predicate.to_string(), ids.iter().map(|s| s.to_string()).collect());
            self
        }

        pub fn with_summary(self, summary: &str) -> Self {
            *self.summary.lock().unwrap() = summary.to_string();
            self
        }

        pub fn with_ready(self, ready: bool) -> Self {
            *self.ready.lock().unwrap() = ready;
            self
        }
    }

    impl Default for StaticGraph {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl KnowledgeGraph for StaticGraph {
        async fn query_by_predicate(&self, predicate: &str) -> Result<Vec<String>, GraphError> {
            Ok(self.predicates.lock().unwrap().get(predicate).cloned().unwrap_or_default())
        }

        async fn hydrate(&self, entity_id: &str, _depth: u32) -> Result<String, GraphError> {
            self.entities
                .lock()
                .unwrap()
                .get(entity_id)
                .cloned()
                .ok_or_else(|| GraphError::NotFound(entity_id.to_string()))
        }

        async fn codebase_summary(&self) -> Result<String, GraphError> {
            let summary = self.summary.lock().unwrap().clone();
            if summary.is_empty() {
                return Err(GraphError::Unavailable("no summary indexed".to_string()));
            }
            Ok(summary)
        }

        async fn wait_for_ready(&self, deadline: Duration) -> Result<(), GraphError> {
            if *self.ready.lock().unwrap() {
                Ok(())
            } else {
                Err(GraphError::NotReady(deadline))
            }
        }
    }
}
