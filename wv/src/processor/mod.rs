//! Processor shell
//!
//! The durable-consumer loop, lifecycle state machine, metrics, and retry
//! classification shared by every LLM-invoking processor. Concrete
//! processors plug in through [`ProcessorHooks`].

mod metrics;
mod shell;
mod state;

pub use metrics::{MetricsSnapshot, ProcessorMetrics};
pub use shell::{HandleError, Processor, ProcessorConfig, ProcessorHooks};
pub use state::{Lifecycle, LifecycleError, ProcessorState};
