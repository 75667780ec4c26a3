//! Plan coordination processor

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::StreamBackend;
use crate::domain::{PlanDraft, WorkflowTrigger};
use crate::planning::PlanCoordinator;
use crate::processor::{HandleError, ProcessorHooks};
use crate::workflow::WorkflowStore;

use super::{decode_trigger, deliver_failure, deliver_success};

const SUCCESS_PHASE: &str = "PlanCreated";
const FAILURE_PHASE: &str = "PlanningFailed";

/// Hooks that run plan coordination for planning triggers
pub struct PlanHooks {
    coordinator: Arc<PlanCoordinator>,
    backend: Arc<dyn StreamBackend>,
    workflow: Arc<WorkflowStore>,
}

impl PlanHooks {
    pub fn new(coordinator: Arc<PlanCoordinator>, backend: Arc<dyn StreamBackend>, workflow: Arc<WorkflowStore>) -> Self {
        Self {
            coordinator,
            backend,
            workflow,
        }
    }
}

#[async_trait]
impl ProcessorHooks for PlanHooks {
    type Trigger = WorkflowTrigger;
    type Artifact = PlanDraft;

    fn name(&self) -> &'static str {
        "plan-coordinator"
    }

    fn decode(&self, payload: &[u8]) -> Result<WorkflowTrigger, HandleError> {
        let trigger = decode_trigger(payload)?;
        if trigger.prompt.is_empty() {
            return Err(HandleError::Invalid("planning trigger has no prompt".to_string()));
        }
        Ok(trigger)
    }

    async fn process(&self, trigger: &WorkflowTrigger) -> Result<PlanDraft, HandleError> {
        self.coordinator
            .coordinate(trigger)
            .await
            .map_err(|e| HandleError::Fatal(format!("plan coordination failed: {e}")))
    }

    async fn commit(&self, trigger: &WorkflowTrigger, plan: PlanDraft) -> Result<(), HandleError> {
        let value = serde_json::to_value(&plan).map_err(|e| HandleError::Fatal(e.to_string()))?;
        deliver_success(
            &self.backend,
            &self.workflow,
            trigger,
            SUCCESS_PHASE,
            vec![("plan".to_string(), value.clone())],
            &value,
        )
        .await
    }

    async fn on_failure(&self, trigger: Option<&WorkflowTrigger>, reason: &str) {
        if let Some(trigger) = trigger {
            deliver_failure(&self.backend, &self.workflow, trigger, FAILURE_PHASE, reason).await;
        }
    }
}
