//! Weaverd - message-driven workflow engine for LLM-backed development
//!
//! Weaverd coordinates the LLM-facing half of a development workflow:
//! long-lived processors consume durable message streams, assemble
//! bounded priority-ordered contexts under a token budget, fan out
//! concurrent planners, and advance workflow state through a
//! revision-checked KV bucket with at-least-once delivery semantics.
//!
//! # Core Concepts
//!
//! - **Budgeted context**: every LLM input is assembled by a task-typed
//!   strategy against a fixed token budget, with ordered provenance
//! - **Graceful degradation**: unready collaborators shrink the context,
//!   they do not fail the request
//! - **At-least-once**: processors classify every failure as ack, nak, or
//!   term; the stream's redelivery policy does the rest
//! - **Optimistic state**: workflow state writes are revision-checked;
//!   losing a race means another actor advanced the workflow
//!
//! # Modules
//!
//! - [`budget`] - token estimation and budget allocation
//! - [`strategy`] - per-task-type context strategies
//! - [`builder`] - the context build pipeline
//! - [`processor`] - the shared consumption loop and lifecycle
//! - [`planning`] - concurrent plan coordination
//! - [`generate`] - format-retrying structured generation

pub mod budget;
pub mod builder;
pub mod bus;
pub mod cli;
pub mod config;
pub mod domain;
pub mod gather;
pub mod generate;
pub mod graph;
pub mod llm;
pub mod planning;
pub mod processor;
pub mod processors;
pub mod qa;
pub mod strategy;
pub mod workflow;

// Re-export commonly used types
pub use budget::{BudgetAllocation, BudgetError, TokenEstimator, estimate_tokens};
pub use builder::{BudgetCalculator, ContextBuilder};
pub use bus::{BusError, MemoryBackend, StreamBackend};
pub use config::Config;
pub use domain::{
    ContextBuildRequest, ContextBuildResponse, Question, StrategyResult, TaskType, Urgency, WorkflowTrigger,
};
pub use generate::{GenerateError, MAX_FORMAT_RETRIES, PhaseGenerator, TaskGenerator, extract_json};
pub use llm::{AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError};
pub use planning::{PlanCoordinator, PlanManager, SessionStore};
pub use processor::{HandleError, Processor, ProcessorConfig, ProcessorHooks, ProcessorState};
pub use qa::{AnsweredQuestion, QaIntegration};
pub use workflow::{AdvanceOutcome, WorkflowState, WorkflowStore};
