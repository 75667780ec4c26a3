//! In-process stream backend
//!
//! A complete implementation of the backend contract over tokio channels:
//! durable consumers with per-message delivery counting and dead-lettering,
//! ephemeral subscriptions, and revision-checked KV buckets with watches.
//! Consumers only see messages published after they attach.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::{BusError, BusMessage, Consumer, KvBucket, KvEntry, KvWatcher, StreamBackend, Subscription, subject_matches};

/// Poll interval for fetch/watch waits
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Queued {
    id: u64,
    subject: String,
    payload: Vec<u8>,
    deliveries: u32,
}

#[derive(Debug)]
struct ConsumerQueue {
    filter: String,
    max_deliver: u32,
    next_id: u64,
    queue: VecDeque<Queued>,
    in_flight: HashMap<u64, Queued>,
    dead: Vec<Queued>,
}

#[derive(Debug, Default)]
struct BucketState {
    entries: HashMap<String, (Vec<u8>, u64)>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<KvEntry>>>,
}

impl BucketState {
    fn notify(&mut self, key: &str, entry: KvEntry) {
        if let Some(watchers) = self.watchers.get_mut(key) {
            watchers.retain(|tx| tx.send(entry.clone()).is_ok());
        }
    }
}

struct SubEntry {
    filter: String,
    tx: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

#[derive(Default)]
struct State {
    consumers: HashMap<String, ConsumerQueue>,
    subscriptions: Vec<SubEntry>,
    buckets: HashMap<String, Arc<Mutex<BucketState>>>,
}

/// In-memory backend; clones share state
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dead-lettered payloads of a consumer, for inspection in tests
    pub async fn dead_letters(&self, stream: &str, name: &str) -> Vec<Vec<u8>> {
        let state = self.state.lock().await;
        state
            .consumers
            .get(&consumer_key(stream, name))
            .map(|q| q.dead.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }
}

fn consumer_key(stream: &str, name: &str) -> String {
    format!("{stream}/{name}")
}

#[async_trait]
impl StreamBackend for MemoryBackend {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut state = self.state.lock().await;

        for queue in state.consumers.values_mut() {
            if subject_matches(&queue.filter, subject) {
                let id = queue.next_id;
                queue.next_id += 1;
                queue.queue.push_back(Queued {
                    id,
                    subject: subject.to_string(),
                    payload: payload.clone(),
                    deliveries: 0,
                });
            }
        }

        state
            .subscriptions
            .retain(|sub| !sub.tx.is_closed());
        for sub in &state.subscriptions {
            if subject_matches(&sub.filter, subject) {
                let _ = sub.tx.send((subject.to_string(), payload.clone()));
            }
        }

        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        state.subscriptions.push(SubEntry {
            filter: subject.to_string(),
            tx,
        });
        Ok(Box::new(MemSubscription { rx }))
    }

    async fn durable_consumer(
        &self,
        stream: &str,
        name: &str,
        filter_subject: &str,
        _ack_wait: Duration,
        max_deliver: u32,
    ) -> Result<Box<dyn Consumer>, BusError> {
        let key = consumer_key(stream, name);
        let mut state = self.state.lock().await;
        state.consumers.entry(key.clone()).or_insert_with(|| ConsumerQueue {
            filter: filter_subject.to_string(),
            max_deliver,
            next_id: 0,
            queue: VecDeque::new(),
            in_flight: HashMap::new(),
            dead: Vec::new(),
        });
        debug!(%key, filter = %filter_subject, "durable consumer attached");
        Ok(Box::new(MemConsumer {
            state: self.state.clone(),
            key,
        }))
    }

    async fn kv_bucket(&self, name: &str, _ttl: Option<Duration>) -> Result<Box<dyn KvBucket>, BusError> {
        let mut state = self.state.lock().await;
        let bucket = state.buckets.entry(name.to_string()).or_default().clone();
        Ok(Box::new(MemKvBucket { bucket }))
    }
}

struct MemConsumer {
    state: Arc<Mutex<State>>,
    key: String,
}

#[async_trait]
impl Consumer for MemConsumer {
    async fn fetch(&self, batch: usize, max_wait: Duration) -> Result<Vec<Box<dyn BusMessage>>, BusError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let mut out: Vec<Box<dyn BusMessage>> = Vec::new();
            {
                let mut state = self.state.lock().await;
                let queue = state
                    .consumers
                    .get_mut(&self.key)
                    .ok_or_else(|| BusError::NotFound(self.key.clone()))?;

                while out.len() < batch {
                    let Some(mut msg) = queue.queue.pop_front() else {
                        break;
                    };
                    if msg.deliveries >= queue.max_deliver {
                        debug!(subject = %msg.subject, deliveries = msg.deliveries, "dead-lettering message");
                        queue.dead.push(msg);
                        continue;
                    }
                    msg.deliveries += 1;
                    let handle = MemMessage {
                        state: self.state.clone(),
                        consumer_key: self.key.clone(),
                        id: msg.id,
                        subject: msg.subject.clone(),
                        payload: msg.payload.clone(),
                    };
                    queue.in_flight.insert(msg.id, msg);
                    out.push(Box::new(handle));
                }
            }

            if !out.is_empty() {
                return Ok(out);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

struct MemMessage {
    state: Arc<Mutex<State>>,
    consumer_key: String,
    id: u64,
    subject: String,
    payload: Vec<u8>,
}

impl MemMessage {
    async fn settle(&self, requeue: bool) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        let queue = state
            .consumers
            .get_mut(&self.consumer_key)
            .ok_or_else(|| BusError::NotFound(self.consumer_key.clone()))?;
        if let Some(msg) = queue.in_flight.remove(&self.id)
            && requeue
        {
            queue.queue.push_front(msg);
        }
        Ok(())
    }
}

#[async_trait]
impl BusMessage for MemMessage {
    fn data(&self) -> &[u8] {
        &self.payload
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    async fn ack(&self) -> Result<(), BusError> {
        self.settle(false).await
    }

    async fn nak(&self) -> Result<(), BusError> {
        self.settle(true).await
    }

    async fn term(&self) -> Result<(), BusError> {
        self.settle(false).await
    }

    async fn in_progress(&self) -> Result<(), BusError> {
        Ok(())
    }
}

struct MemSubscription {
    rx: mpsc::UnboundedReceiver<(String, Vec<u8>)>,
}

#[async_trait]
impl Subscription for MemSubscription {
    async fn next(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>, BusError> {
        match tokio::time::timeout(max_wait, self.rx.recv()).await {
            Ok(Some((_, payload))) => Ok(Some(payload)),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Ok(None),
        }
    }
}

struct MemKvBucket {
    bucket: Arc<Mutex<BucketState>>,
}

#[async_trait]
impl KvBucket for MemKvBucket {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, BusError> {
        let bucket = self.bucket.lock().await;
        Ok(bucket.entries.get(key).map(|(value, revision)| KvEntry {
            value: value.clone(),
            revision: *revision,
        }))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, BusError> {
        let mut bucket = self.bucket.lock().await;
        let revision = bucket.entries.get(key).map(|(_, r)| r + 1).unwrap_or(1);
        bucket.entries.insert(key.to_string(), (value.clone(), revision));
        bucket.notify(key, KvEntry { value, revision });
        Ok(revision)
    }

    async fn update(&self, key: &str, value: Vec<u8>, expected_revision: u64) -> Result<u64, BusError> {
        let mut bucket = self.bucket.lock().await;
        let current = bucket.entries.get(key).map(|(_, r)| *r);
        let revision = match (current, expected_revision) {
            // Creation: the caller saw no entry.
            (None, 0) => 1,
            (None, expected) => {
                return Err(BusError::RevisionConflict {
                    key: key.to_string(),
                    expected,
                    actual: 0,
                });
            }
            (Some(actual), expected) if actual == expected => actual + 1,
            (Some(actual), expected) => {
                return Err(BusError::RevisionConflict {
                    key: key.to_string(),
                    expected,
                    actual,
                });
            }
        };
        bucket.entries.insert(key.to_string(), (value.clone(), revision));
        bucket.notify(key, KvEntry { value, revision });
        Ok(revision)
    }

    async fn watch(&self, key: &str) -> Result<Box<dyn KvWatcher>, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut bucket = self.bucket.lock().await;
        bucket.watchers.entry(key.to_string()).or_default().push(tx);
        Ok(Box::new(MemKvWatcher { rx, stopped: false }))
    }
}

struct MemKvWatcher {
    rx: mpsc::UnboundedReceiver<KvEntry>,
    stopped: bool,
}

#[async_trait]
impl KvWatcher for MemKvWatcher {
    async fn next(&mut self, max_wait: Duration) -> Result<Option<KvEntry>, BusError> {
        if self.stopped {
            return Ok(None);
        }
        match tokio::time::timeout(max_wait, self.rx.recv()).await {
            Ok(Some(entry)) => Ok(Some(entry)),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Ok(None),
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_fetch_ack() {
        let backend = MemoryBackend::new();
        let consumer = backend
            .durable_consumer("work", "ctx", "work.ctx", Duration::from_secs(60), 3)
            .await
            .unwrap();

        backend.publish("work.ctx", b"hello".to_vec()).await.unwrap();

        let msgs = consumer.fetch(1, Duration::from_millis(200)).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data(), b"hello");
        msgs[0].ack().await.unwrap();

        let msgs = consumer.fetch(1, Duration::from_millis(50)).await.unwrap();
        assert!(msgs.is_empty());
    }

    #[tokio::test]
    async fn test_nak_redelivers() {
        let backend = MemoryBackend::new();
        let consumer = backend
            .durable_consumer("work", "ctx", "work.>", Duration::from_secs(60), 3)
            .await
            .unwrap();

        backend.publish("work.ctx.r-1", b"retry me".to_vec()).await.unwrap();

        let msgs = consumer.fetch(1, Duration::from_millis(200)).await.unwrap();
        msgs[0].nak().await.unwrap();

        let msgs = consumer.fetch(1, Duration::from_millis(200)).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data(), b"retry me");
    }

    #[tokio::test]
    async fn test_max_deliver_dead_letters() {
        let backend = MemoryBackend::new();
        let consumer = backend
            .durable_consumer("work", "ctx", "work.ctx", Duration::from_secs(60), 3)
            .await
            .unwrap();

        backend.publish("work.ctx", b"poison".to_vec()).await.unwrap();

        // Exactly three attempts, then nothing.
        for _ in 0..3 {
            let msgs = consumer.fetch(1, Duration::from_millis(200)).await.unwrap();
            assert_eq!(msgs.len(), 1);
            msgs[0].nak().await.unwrap();
        }
        let msgs = consumer.fetch(1, Duration::from_millis(50)).await.unwrap();
        assert!(msgs.is_empty());

        let dead = backend.dead_letters("work", "ctx").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0], b"poison");
    }

    #[tokio::test]
    async fn test_term_drops_without_redelivery() {
        let backend = MemoryBackend::new();
        let consumer = backend
            .durable_consumer("work", "ctx", "work.ctx", Duration::from_secs(60), 3)
            .await
            .unwrap();

        backend.publish("work.ctx", b"malformed".to_vec()).await.unwrap();

        let msgs = consumer.fetch(1, Duration::from_millis(200)).await.unwrap();
        msgs[0].term().await.unwrap();

        let msgs = consumer.fetch(1, Duration::from_millis(50)).await.unwrap();
        assert!(msgs.is_empty());
        assert!(backend.dead_letters("work", "ctx").await.is_empty());
    }

    #[tokio::test]
    async fn test_subscription_receives_matching() {
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe("answers.*").await.unwrap();

        backend.publish("answers.q-1", b"yes".to_vec()).await.unwrap();
        backend.publish("other.q-2", b"no".to_vec()).await.unwrap();

        let got = sub.next(Duration::from_millis(200)).await.unwrap();
        assert_eq!(got, Some(b"yes".to_vec()));
        let got = sub.next(Duration::from_millis(50)).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_kv_put_get_revisions() {
        let backend = MemoryBackend::new();
        let kv = backend.kv_bucket("state", None).await.unwrap();

        let r1 = kv.put("exec-1", b"v1".to_vec()).await.unwrap();
        assert_eq!(r1, 1);
        let r2 = kv.put("exec-1", b"v2".to_vec()).await.unwrap();
        assert_eq!(r2, 2);

        let entry = kv.get("exec-1").await.unwrap().unwrap();
        assert_eq!(entry.value, b"v2");
        assert_eq!(entry.revision, 2);
    }

    #[tokio::test]
    async fn test_kv_update_revision_check() {
        let backend = MemoryBackend::new();
        let kv = backend.kv_bucket("state", None).await.unwrap();

        kv.put("exec-1", b"v1".to_vec()).await.unwrap();
        let r = kv.update("exec-1", b"v2".to_vec(), 1).await.unwrap();
        assert_eq!(r, 2);

        let err = kv.update("exec-1", b"v3".to_vec(), 1).await.unwrap_err();
        assert!(matches!(err, BusError::RevisionConflict { expected: 1, actual: 2, .. }));
    }

    #[tokio::test]
    async fn test_kv_watch_sees_updates() {
        let backend = MemoryBackend::new();
        let kv = backend.kv_bucket("answers", None).await.unwrap();
        let mut watcher = kv.watch("q-1").await.unwrap();

        kv.put("q-1", b"answered".to_vec()).await.unwrap();

        let entry = watcher.next(Duration::from_millis(200)).await.unwrap().unwrap();
        assert_eq!(entry.value, b"answered");

        watcher.stop();
        assert!(watcher.next(Duration::from_millis(10)).await.unwrap().is_none());
    }
}
