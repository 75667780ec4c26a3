//! First-use graph readiness latch
//!
//! Success latches permanently; failure is never cached, so the next
//! caller probes again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::KnowledgeGraph;

/// Double-checked readiness probe shared by all strategies of a builder
pub struct GraphReadiness {
    ready: AtomicBool,
    probe: Mutex<()>,
    budget: Duration,
}

impl GraphReadiness {
    pub fn new(budget: Duration) -> Self {
        Self {
            ready: AtomicBool::new(false),
            probe: Mutex::new(()),
            budget,
        }
    }

    /// Whether the graph has already been seen ready
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Probe the graph unless already latched ready
    pub async fn ensure_ready(&self, graph: &Arc<dyn KnowledgeGraph>) -> bool {
        if self.ready.load(Ordering::Acquire) {
            return true;
        }

        let _guard = self.probe.lock().await;
        if self.ready.load(Ordering::Acquire) {
            return true;
        }

        match graph.wait_for_ready(self.budget).await {
            Ok(()) => {
                debug!("graph readiness probe succeeded");
                self.ready.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                warn!(error = %e, "graph readiness probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mock::StaticGraph;

    #[tokio::test]
    async fn test_latches_on_success() {
        let graph: Arc<dyn KnowledgeGraph> = Arc::new(StaticGraph::new());
        let readiness = GraphReadiness::new(Duration::from_millis(100));

        assert!(!readiness.is_ready());
        assert!(readiness.ensure_ready(&graph).await);
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let readiness = GraphReadiness::new(Duration::from_millis(50));

        let unready: Arc<dyn KnowledgeGraph> = Arc::new(StaticGraph::new().with_ready(false));
        assert!(!readiness.ensure_ready(&unready).await);
        assert!(!readiness.is_ready());

        // A later probe against a now-ready graph succeeds.
        let ready: Arc<dyn KnowledgeGraph> = Arc::new(StaticGraph::new());
        assert!(readiness.ensure_ready(&ready).await);
        assert!(readiness.is_ready());
    }
}
