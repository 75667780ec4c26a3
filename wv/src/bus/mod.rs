//! Durable stream backend contract
//!
//! The engine never talks to a concrete broker; every processor is written
//! against these traits. The contract is deliberately small: publish,
//! durable fetch with ack/nak/term, and revision-checked KV buckets with
//! watches. `memory` provides the in-process implementation used by tests
//! and the one-shot CLI path.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryBackend;

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("backend closed")]
    Closed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("revision conflict on {key}: expected {expected}, found {actual}")]
    RevisionConflict { key: String, expected: u64, actual: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl BusError {
    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BusError::Closed => true,
            BusError::Timeout(_) => true,
            BusError::NotFound(_) => false,
            BusError::RevisionConflict { .. } => false,
            BusError::Serialization(_) => false,
            BusError::Other(_) => true,
        }
    }
}

/// A value read from a KV bucket, paired with its revision
#[derive(Debug, Clone)]
pub struct KvEntry {
    pub value: Vec<u8>,
    pub revision: u64,
}

/// A message held by a consumer until acknowledged
#[async_trait]
pub trait BusMessage: Send + Sync {
    fn data(&self) -> &[u8];
    fn subject(&self) -> &str;

    /// Mark successfully processed; the message will not be redelivered
    async fn ack(&self) -> Result<(), BusError>;

    /// Negative-acknowledge; the message becomes eligible for redelivery
    async fn nak(&self) -> Result<(), BusError>;

    /// Terminate; the message is dropped without redelivery
    async fn term(&self) -> Result<(), BusError>;

    /// Extend the ack deadline while processing continues
    async fn in_progress(&self) -> Result<(), BusError>;
}

/// A durable consumer attached to a stream
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Fetch up to `batch` messages, waiting at most `max_wait`
    ///
    /// An empty result after `max_wait` is not an error.
    async fn fetch(&self, batch: usize, max_wait: Duration) -> Result<Vec<Box<dyn BusMessage>>, BusError>;
}

/// An ephemeral subscription used by the Q&A fallback path
#[async_trait]
pub trait Subscription: Send {
    /// Next payload on the subject, or `None` if `max_wait` elapses
    async fn next(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>, BusError>;
}

/// A watcher on a single KV key
#[async_trait]
pub trait KvWatcher: Send {
    /// Next update to the key, or `None` if `max_wait` elapses
    async fn next(&mut self, max_wait: Duration) -> Result<Option<KvEntry>, BusError>;

    fn stop(&mut self);
}

/// A named KV bucket with optimistic concurrency
#[async_trait]
pub trait KvBucket: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, BusError>;

    /// Create or overwrite, returning the new revision
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, BusError>;

    /// Write only if the stored revision equals `expected_revision`
    async fn update(&self, key: &str, value: Vec<u8>, expected_revision: u64) -> Result<u64, BusError>;

    async fn watch(&self, key: &str) -> Result<Box<dyn KvWatcher>, BusError>;
}

/// The durable stream backend every processor is built against
#[async_trait]
pub trait StreamBackend: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, BusError>;

    async fn durable_consumer(
        &self,
        stream: &str,
        name: &str,
        filter_subject: &str,
        ack_wait: Duration,
        max_deliver: u32,
    ) -> Result<Box<dyn Consumer>, BusError>;

    /// Create the bucket if missing, otherwise return the existing one
    async fn kv_bucket(&self, name: &str, ttl: Option<Duration>) -> Result<Box<dyn KvBucket>, BusError>;
}

/// Token-wise subject matching: `*` matches one token, a trailing `>`
/// matches the rest
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    if filter == subject {
        return true;
    }

    let mut filter_tokens = filter.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(">"), _) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(f), Some(s)) if f == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_matches_exact() {
        assert!(subject_matches("context.out.r-1", "context.out.r-1"));
        assert!(!subject_matches("context.out.r-1", "context.out.r-2"));
    }

    #[test]
    fn test_subject_matches_single_wildcard() {
        assert!(subject_matches("answers.*", "answers.q-1"));
        assert!(!subject_matches("answers.*", "answers.q-1.extra"));
    }

    #[test]
    fn test_subject_matches_tail_wildcard() {
        assert!(subject_matches("answers.>", "answers.q-1.extra"));
        assert!(subject_matches("answers.>", "answers.q-1"));
        assert!(!subject_matches("answers.>", "answers"));
    }

    #[test]
    fn test_retryability() {
        assert!(BusError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(
            !BusError::RevisionConflict {
                key: "k".into(),
                expected: 1,
                actual: 2
            }
            .is_retryable()
        );
        assert!(!BusError::NotFound("x".into()).is_retryable());
    }
}
