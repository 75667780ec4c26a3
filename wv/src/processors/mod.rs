//! Concrete processors
//!
//! Hook implementations that plug the context builder, plan coordinator,
//! and the phase/task generators into the shared processor shell. Result
//! delivery is shared: workflow mode (revision-checked KV state) when the
//! trigger carries an execution id, callback mode otherwise.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::bus::StreamBackend;
use crate::domain::{Envelope, WorkflowTrigger};
use crate::processor::HandleError;
use crate::workflow::WorkflowStore;

mod context;
mod phases;
mod plan;
mod tasks;

pub use context::ContextHooks;
pub use phases::PhaseHooks;
pub use plan::PlanHooks;
pub use tasks::TaskHooks;

/// Callback payload published in callback mode
#[derive(Debug, Serialize)]
struct Callback<'a> {
    request_id: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
}

/// Decode an envelope-wrapped workflow trigger
///
/// Syntax errors are unparseable; a missing request id is invalid.
pub(crate) fn decode_trigger(payload: &[u8]) -> Result<WorkflowTrigger, HandleError> {
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| HandleError::Unparseable(format!("bad envelope: {e}")))?;
    let trigger: WorkflowTrigger = serde_json::from_value(envelope.payload)
        .map_err(|e| HandleError::Unparseable(format!("bad trigger payload: {e}")))?;
    if trigger.request_id.is_empty() {
        return Err(HandleError::Invalid("trigger has no request_id".to_string()));
    }
    Ok(trigger)
}

/// Deliver a success through exactly one of the two modes
///
/// Workflow mode wins when an execution id is present. A KV revision
/// conflict inside `advance` already reads as "workflow moved on" and is
/// success here.
pub(crate) async fn deliver_success(
    backend: &Arc<dyn StreamBackend>,
    workflow: &WorkflowStore,
    trigger: &WorkflowTrigger,
    phase: &str,
    payload: Vec<(String, Value)>,
    result: &Value,
) -> Result<(), HandleError> {
    if trigger.is_workflow_mode() {
        workflow
            .advance(&trigger.execution_id, phase, payload)
            .await
            .map_err(|e| HandleError::Retryable(format!("workflow state write failed: {e}")))?;
        return Ok(());
    }

    if !trigger.callback_subject.is_empty() {
        let callback = Callback {
            request_id: &trigger.request_id,
            status: "ok",
            error: None,
            result: Some(result),
        };
        let bytes = serde_json::to_vec(&callback).map_err(|e| HandleError::Fatal(e.to_string()))?;
        backend
            .publish(&trigger.callback_subject, bytes)
            .await
            .map_err(|e| HandleError::Retryable(format!("callback publish failed: {e}")))?;
        return Ok(());
    }

    debug!(request_id = %trigger.request_id, "trigger carries neither execution id nor callback subject");
    Ok(())
}

/// Report a failure through the active delivery mode
pub(crate) async fn deliver_failure(
    backend: &Arc<dyn StreamBackend>,
    workflow: &WorkflowStore,
    trigger: &WorkflowTrigger,
    failure_phase: &str,
    reason: &str,
) {
    if trigger.is_workflow_mode() {
        if let Err(e) = workflow.fail(&trigger.execution_id, failure_phase, reason).await {
            warn!(execution_id = %trigger.execution_id, error = %e, "failure state write failed");
        }
        return;
    }

    if !trigger.callback_subject.is_empty() {
        let callback = Callback {
            request_id: &trigger.request_id,
            status: "error",
            error: Some(reason),
            result: None,
        };
        if let Ok(bytes) = serde_json::to_vec(&callback)
            && let Err(e) = backend.publish(&trigger.callback_subject, bytes).await
        {
            warn!(subject = %trigger.callback_subject, error = %e, "failure callback publish failed");
        }
    }
}
