//! Phase generation processor

use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::ContextBuilder;
use crate::bus::StreamBackend;
use crate::domain::{ContextBuildRequest, GeneratedPhases, TaskType, WorkflowTrigger};
use crate::generate::{GenerateError, PhaseGenerator};
use crate::planning::PlanManager;
use crate::processor::{HandleError, ProcessorHooks};
use crate::workflow::WorkflowStore;

use super::{decode_trigger, deliver_failure, deliver_success};

const SUCCESS_PHASE: &str = "PhasesGenerated";
const FAILURE_PHASE: &str = "PhaseGenerationFailed";

/// Render the context documents into one prompt block
pub(crate) fn render_context(documents: &std::collections::BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, doc) in documents {
        out.push_str(&format!("### {key}\n{doc}\n\n"));
    }
    out
}

pub(crate) fn map_generate_error(e: GenerateError) -> HandleError {
    if e.is_retryable() {
        HandleError::Retryable(e.to_string())
    } else {
        HandleError::Fatal(e.to_string())
    }
}

/// Hooks that generate development phases for a trigger
pub struct PhaseHooks {
    builder: Arc<ContextBuilder>,
    generator: PhaseGenerator,
    backend: Arc<dyn StreamBackend>,
    workflow: Arc<WorkflowStore>,
    plans: Arc<dyn PlanManager>,
}

impl PhaseHooks {
    pub fn new(
        builder: Arc<ContextBuilder>,
        generator: PhaseGenerator,
        backend: Arc<dyn StreamBackend>,
        workflow: Arc<WorkflowStore>,
        plans: Arc<dyn PlanManager>,
    ) -> Self {
        Self {
            builder,
            generator,
            backend,
            workflow,
            plans,
        }
    }
}

#[async_trait]
impl ProcessorHooks for PhaseHooks {
    type Trigger = WorkflowTrigger;
    type Artifact = GeneratedPhases;

    fn name(&self) -> &'static str {
        "phase-generator"
    }

    fn decode(&self, payload: &[u8]) -> Result<WorkflowTrigger, HandleError> {
        let trigger = decode_trigger(payload)?;
        if trigger.prompt.is_empty() {
            return Err(HandleError::Invalid("phase trigger has no prompt".to_string()));
        }
        Ok(trigger)
    }

    async fn process(&self, trigger: &WorkflowTrigger) -> Result<GeneratedPhases, HandleError> {
        let context = self
            .builder
            .build(&ContextBuildRequest {
                request_id: format!("{}-ctx", trigger.request_id),
                task_type: TaskType::Planning,
                workflow_id: trigger.loop_id.clone(),
                topic: trigger.title.clone(),
                plan_slug: trigger.slug.clone(),
                ..Default::default()
            })
            .await;

        self.generator
            .generate(&trigger.prompt, &render_context(&context.documents), &context.sop_requirements)
            .await
            .map_err(map_generate_error)
    }

    async fn commit(&self, trigger: &WorkflowTrigger, phases: GeneratedPhases) -> Result<(), HandleError> {
        self.plans
            .save_phases(&trigger.slug, &phases)
            .await
            .map_err(|e| HandleError::Retryable(format!("phase persistence failed: {e}")))?;

        let value = serde_json::to_value(&phases).map_err(|e| HandleError::Fatal(e.to_string()))?;
        deliver_success(
            &self.backend,
            &self.workflow,
            trigger,
            SUCCESS_PHASE,
            vec![("phases".to_string(), value.clone())],
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
