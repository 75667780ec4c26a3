//! Per-processor metrics

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Atomic counters shared between the consumption loop and observers
#[derive(Debug)]
pub struct ProcessorMetrics {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    terminated: AtomicU64,
    last_activity: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of the counters, for logging
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub terminated: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl Default for ProcessorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorMetrics {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            terminated: AtomicU64::new(0),
            last_activity: RwLock::new(None),
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminated(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    fn touch(&self) {
        if let Ok(mut guard) = self.last_activity.write() {
            *guard = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            last_activity: self.last_activity.read().ok().and_then(|g| *g),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_activity() {
        let metrics = ProcessorMetrics::new();
        assert!(metrics.snapshot().last_activity.is_none());

        metrics.record_processed();
        metrics.record_success();
        metrics.record_processed();
        metrics.record_failure();
        metrics.record_retry();

        let snap = metrics.snapshot();
        assert_eq!(snap.processed, 2);
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.retried, 1);
        assert_eq!(snap.terminated, 0);
        assert!(snap.last_activity.is_some());
    }
}
