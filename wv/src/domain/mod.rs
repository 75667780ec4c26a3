//! Core domain types
//!
//! Requests, responses, strategy results, plan sessions, generated
//! artifacts, and the standards rule set. Everything that crosses a module
//! boundary lives here.

mod phase;
mod plan;
mod request;
mod response;
mod result;
mod standards;
mod trigger;

pub use phase::{AcceptanceCriterion, GeneratedPhases, GeneratedTasks, PhaseSpec, TaskKind, TaskSpec};
pub use plan::{FocusArea, PlanDraft, PlanScope, PlannerState, PlannerStatus, PlanSession, SessionStatus};
pub use request::{ContextBuildRequest, RequestError, TaskType};
pub use response::{ContextBuildResponse, ProvenanceEntry, SourceType};
pub use result::{keys, Question, StrategyResult, Urgency};
pub use standards::{Constitution, Rule, Severity};
pub use trigger::{Envelope, MessageType, WorkflowTrigger};
