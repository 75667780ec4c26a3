//! Shared processor shell
//!
//! Every LLM-invoking processor is this loop plus three hooks: decode the
//! payload, process the trigger, commit the artifact. The shell owns the
//! durable consumer, the lifecycle state machine, metrics, heartbeats,
//! and the ack/nak/term classification of errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, eyre};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{BusMessage, Consumer, StreamBackend};

use super::metrics::{MetricsSnapshot, ProcessorMetrics};
use super::state::{Lifecycle, ProcessorState};

/// Max-wait for each consumer fetch
const FETCH_WAIT: Duration = Duration::from_secs(5);

/// How a handling failure should settle the message
#[derive(Debug)]
pub enum HandleError {
    /// Syntactically broken payload; terminate, a retry cannot help
    Unparseable(String),

    /// Schema-valid but semantically bad; acknowledge idempotently
    Invalid(String),

    /// Transient failure; negative-acknowledge for redelivery
    Retryable(String),

    /// Permanent failure; terminate
    Fatal(String),

    /// Shutdown raced the handler; negative-acknowledge so another
    /// instance picks the message up
    Cancelled,
}

impl HandleError {
    pub fn reason(&self) -> &str {
        match self {
            HandleError::Unparseable(r)
            | HandleError::Invalid(r)
            | HandleError::Retryable(r)
            | HandleError::Fatal(r) => r,
            HandleError::Cancelled => "shutdown in progress",
        }
    }
}

/// The three hooks a concrete processor supplies
#[async_trait]
pub trait ProcessorHooks: Send + Sync + 'static {
    type Trigger: Send + Sync;
    type Artifact: Send;

    /// Short name for logs and the durable consumer
    fn name(&self) -> &'static str;

    /// Parse and validate the raw payload
    fn decode(&self, payload: &[u8]) -> Result<Self::Trigger, HandleError>;

    /// The expensive step; the shell signals in-progress before calling
    async fn process(&self, trigger: &Self::Trigger) -> Result<Self::Artifact, HandleError>;

    /// Persist or publish the artifact
    async fn commit(&self, trigger: &Self::Trigger, artifact: Self::Artifact) -> Result<(), HandleError>;

    /// Invoked on `Invalid` and `Fatal` outcomes, e.g. to publish a
    /// failure callback or move workflow state to a failure terminal
    async fn on_failure(&self, _trigger: Option<&Self::Trigger>, _reason: &str) {}
}

/// Consumer wiring for one processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub stream: String,
    pub consumer: String,
    pub subject: String,
    pub ack_wait: Duration,
    pub max_deliver: u32,
}

impl ProcessorConfig {
    pub fn new(stream: impl Into<String>, consumer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            consumer: consumer.into(),
            subject: subject.into(),
            ack_wait: Duration::from_secs(120),
            max_deliver: 3,
        }
    }

    /// Override the ack deadline; LLM-heavy processors run long
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }
}

/// The shared consumption loop around a set of hooks
pub struct Processor<H: ProcessorHooks> {
    hooks: Arc<H>,
    backend: Arc<dyn StreamBackend>,
    config: ProcessorConfig,
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<ProcessorMetrics>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<H: ProcessorHooks> Processor<H> {
    pub fn new(hooks: H, backend: Arc<dyn StreamBackend>, config: ProcessorConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            hooks: Arc::new(hooks),
            backend,
            config,
            lifecycle: Arc::new(Lifecycle::new()),
            metrics: Arc::new(ProcessorMetrics::new()),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ProcessorState {
        self.lifecycle.current()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Attach the durable consumer and spawn the consumption loop
    pub async fn start(&self) -> Result<()> {
        self.lifecycle
            .begin_start()
            .map_err(|e| eyre!("{} processor: {e}", self.hooks.name()))?;

        let consumer = match self
            .backend
            .durable_consumer(
                &self.config.stream,
                &self.config.consumer,
                &self.config.subject,
                self.config.ack_wait,
                self.config.max_deliver,
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                // Setup never reached Running; roll back.
                self.lifecycle.rollback_start();
                return Err(eyre!("{} processor: consumer setup failed: {e}", self.hooks.name()));
            }
        };

        let _ = self.shutdown_tx.send(false);
        let loop_task = consumption_loop(
            self.hooks.clone(),
            consumer,
            self.metrics.clone(),
            self.shutdown_tx.subscribe(),
        );
        *self.task.lock().await = Some(tokio::spawn(loop_task));

        self.lifecycle.mark_running();
        info!(processor = self.hooks.name(), subject = %self.config.subject, "processor started");
        Ok(())
    }

    /// Stop the loop and wait for it to drain
    pub async fn stop(&self) -> Result<()> {
        match self.lifecycle.begin_stop() {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => return Err(eyre!("{} processor: {e}", self.hooks.name())),
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.lock().await.take()
            && let Err(e) = task.await
        {
            warn!(processor = self.hooks.name(), error = %e, "consumption task join failed");
        }

        let snapshot = self.metrics.snapshot();
        info!(
            processor = self.hooks.name(),
            processed = snapshot.processed,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            "processor stopped"
        );
        self.lifecycle.mark_stopped();
        Ok(())
    }
}

async fn consumption_loop<H: ProcessorHooks>(
    hooks: Arc<H>,
    consumer: Box<dyn Consumer>,
    metrics: Arc<ProcessorMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(processor = hooks.name(), "consumption loop entered");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let fetched = tokio::select! {
            _ = shutdown.changed() => break,
            fetched = consumer.fetch(1, FETCH_WAIT) => fetched,
        };

        let messages = match fetched {
            Ok(messages) => messages,
            Err(e) => {
                warn!(processor = hooks.name(), error = %e, "fetch failed");
                continue;
            }
        };

        for message in messages {
            // A message fetched right as shutdown lands goes back to the
            // stream instead of being half-processed.
            if *shutdown.borrow() {
                let _ = message.nak().await;
                return;
            }
            handle_message(hooks.as_ref(), message, &metrics, &mut shutdown).await;
        }
    }
    debug!(processor = hooks.name(), "consumption loop exited");
}

async fn handle_message<H: ProcessorHooks>(
    hooks: &H,
    message: Box<dyn BusMessage>,
    metrics: &ProcessorMetrics,
    shutdown: &mut watch::Receiver<bool>,
) {
    metrics.record_processed();

    let trigger = match hooks.decode(message.data()) {
        Ok(trigger) => trigger,
        Err(HandleError::Invalid(reason)) => {
            warn!(processor = hooks.name(), %reason, "invalid trigger, acknowledging");
            metrics.record_failure();
            hooks.on_failure(None, &reason).await;
            let _ = message.ack().await;
            return;
        }
        Err(e) => {
            warn!(processor = hooks.name(), reason = e.reason(), "unparseable trigger, terminating");
            metrics.record_terminated();
            let _ = message.term().await;
            return;
        }
    };

    // Extend the ack deadline before the expensive part.
    let _ = message.in_progress().await;

    let outcome = tokio::select! {
        _ = shutdown.changed() => Err(HandleError::Cancelled),
        outcome = async {
            let artifact = hooks.process(&trigger).await?;
            hooks.commit(&trigger, artifact).await
        } => outcome,
    };

    match outcome {
        Ok(()) => {
            metrics.record_success();
            let _ = message.ack().await;
        }
        Err(HandleError::Invalid(reason)) => {
            warn!(processor = hooks.name(), %reason, "invalid request, acknowledging");
            metrics.record_failure();
            hooks.on_failure(Some(&trigger), &reason).await;
            let _ = message.ack().await;
        }
        Err(HandleError::Retryable(reason)) => {
            warn!(processor = hooks.name(), %reason, "transient failure, requeueing");
            metrics.record_retry();
            let _ = message.nak().await;
        }
        Err(HandleError::Unparseable(reason)) | Err(HandleError::Fatal(reason)) => {
            error!(processor = hooks.name(), %reason, "permanent failure, terminating");
            metrics.record_failure();
            metrics.record_terminated();
            hooks.on_failure(Some(&trigger), &reason).await;
            let _ = message.term().await;
        }
        Err(HandleError::Cancelled) => {
            debug!(processor = hooks.name(), "shutdown during handling, requeueing");
            let _ = message.nak().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBackend;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Hooks that settle according to a scripted behavior
    struct ScriptedHooks {
        behavior: &'static str,
        processed: AtomicU64,
    }

    impl ScriptedHooks {
        fn new(behavior: &'static str) -> Self {
            Self {
                behavior,
                processed: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl ProcessorHooks for ScriptedHooks {
        type Trigger = String;
        type Artifact = ();

        fn name(&self) -> &'static str {
            "scripted"
        }

        fn decode(&self, payload: &[u8]) -> Result<String, HandleError> {
            let text = String::from_utf8_lossy(payload).to_string();
            if text == "garbage" {
                return Err(HandleError::Unparseable("not json".into()));
            }
            Ok(text)
        }

        async fn process(&self, _trigger: &String) -> Result<(), HandleError> {
            self.processed.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                "fail-retryable" => Err(HandleError::Retryable("backend down".into())),
                "fail-invalid" => Err(HandleError::Invalid("bad semantics".into())),
                _ => Ok(()),
            }
        }

        async fn commit(&self, _trigger: &String, _artifact: ()) -> Result<(), HandleError> {
            Ok(())
        }
    }

    async fn processor_over(
        behavior: &'static str,
        backend: &MemoryBackend,
    ) -> Processor<ScriptedHooks> {
        let config = ProcessorConfig::new("work", "scripted", "work.trigger");
        Processor::new(ScriptedHooks::new(behavior), Arc::new(backend.clone()), config)
    }

    #[tokio::test]
    async fn test_success_path_acks() {
        let backend = MemoryBackend::new();
        let processor = processor_over("ok", &backend).await;
        processor.start().await.unwrap();
        assert_eq!(processor.state(), ProcessorState::Running);

        backend.publish("work.trigger", b"payload".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        processor.stop().await.unwrap();
        assert_eq!(processor.state(), ProcessorState::Stopped);

        let metrics = processor.metrics();
        assert_eq!(metrics.processed, 1);
        assert_eq!(metrics.succeeded, 1);
        assert!(backend.dead_letters("work", "scripted").await.is_empty());
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let backend = MemoryBackend::new();
        let processor = processor_over("ok", &backend).await;
        processor.start().await.unwrap();
        assert!(processor.start().await.is_err());
        processor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let backend = MemoryBackend::new();
        let processor = processor_over("ok", &backend).await;
        processor.stop().await.unwrap();
        assert_eq!(processor.state(), ProcessorState::Stopped);
    }

    #[tokio::test]
    async fn test_unparseable_terminates_without_retry() {
        let backend = MemoryBackend::new();
        let processor = processor_over("ok", &backend).await;
        processor.start().await.unwrap();

        backend.publish("work.trigger", b"garbage".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        processor.stop().await.unwrap();

        let metrics = processor.metrics();
        assert_eq!(metrics.terminated, 1);
        assert_eq!(metrics.succeeded, 0);
    }

    #[tokio::test]
    async fn test_retryable_naks_until_dead_letter() {
        let backend = MemoryBackend::new();
        let processor = processor_over("fail-retryable", &backend).await;
        processor.start().await.unwrap();

        backend.publish("work.trigger", b"payload".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        processor.stop().await.unwrap();

        // MaxDeliver=3: exactly three attempts, then the dead letter queue.
        assert_eq!(processor.metrics().retried, 3);
        assert_eq!(backend.dead_letters("work", "scripted").await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_is_acked_once() {
        let backend = MemoryBackend::new();
        let processor = processor_over("fail-invalid", &backend).await;
        processor.start().await.unwrap();

        backend.publish("work.trigger", b"payload".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        processor.stop().await.unwrap();

        let metrics = processor.metrics();
        assert_eq!(metrics.processed, 1);
        assert_eq!(metrics.failed, 1);
        assert!(backend.dead_letters("work", "scripted").await.is_empty());
    }
}
