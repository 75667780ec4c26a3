//! Task generation processor

use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::ContextBuilder;
use crate::bus::StreamBackend;
use crate::domain::{ContextBuildRequest, GeneratedTasks, TaskType, WorkflowTrigger, keys};
use crate::generate::TaskGenerator;
use crate::planning::PlanManager;
use crate::processor::{HandleError, ProcessorHooks};
use crate::workflow::WorkflowStore;

use super::phases::{map_generate_error, render_context};
use super::{decode_trigger, deliver_failure, deliver_success};

const SUCCESS_PHASE: &str = "TasksGenerated";
const FAILURE_PHASE: &str = "TaskGenerationFailed";

/// Hooks that generate typed tasks for a trigger
pub struct TaskHooks {
    builder: Arc<ContextBuilder>,
    generator: TaskGenerator,
    backend: Arc<dyn StreamBackend>,
    workflow: Arc<WorkflowStore>,
    plans: Arc<dyn PlanManager>,
}

impl TaskHooks {
    pub fn new(
        builder: Arc<ContextBuilder>,
        generator: TaskGenerator,
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

    /// Phase ids recorded on the workflow state by a previous phase
    /// generation, if any
    async fn known_phase_ids(&self, trigger: &WorkflowTrigger) -> Vec<String> {
        if !trigger.is_workflow_mode() {
            return Vec::new();
        }
        let Ok((state, _)) = self.workflow.read(&trigger.execution_id).await else {
            return Vec::new();
        };
        state
            .payload
            .get("phases")
            .and_then(|p| p.get("phases"))
            .and_then(|p| p.as_array())
            .map(|phases| {
                phases
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        p.get("name")
                            .and_then(|n| n.as_str())
                            .map(|n| format!("{}-{}", trigger.slug, n.to_lowercase().replace(' ', "-")))
                            .unwrap_or_else(|| format!("{}-phase-{}", trigger.slug, i + 1))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProcessorHooks for TaskHooks {
    type Trigger = WorkflowTrigger;
    type Artifact = GeneratedTasks;

    fn name(&self) -> &'static str {
        "task-generator"
    }

    fn decode(&self, payload: &[u8]) -> Result<WorkflowTrigger, HandleError> {
        let trigger = decode_trigger(payload)?;
        if trigger.prompt.is_empty() {
            return Err(HandleError::Invalid("task trigger has no prompt".to_string()));
        }
        Ok(trigger)
    }

    async fn process(&self, trigger: &WorkflowTrigger) -> Result<GeneratedTasks, HandleError> {
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

        // The file tree doc backs hallucination checks on task files.
        let file_tree: Vec<String> = context
            .documents
            .get(keys::FILE_TREE)
            .map(|tree| tree.lines().skip(1).map(str::to_string).collect())
            .unwrap_or_default();

        let phase_ids = self.known_phase_ids(trigger).await;
        let known_ids: Vec<String> = phase_ids.clone();

        self.generator
            .generate(
                &trigger.prompt,
                &render_context(&context.documents),
                &context.sop_requirements,
                &trigger.slug,
                &known_ids,
                &phase_ids,
                &file_tree,
            )
            .await
            .map_err(map_generate_error)
    }

    async fn commit(&self, trigger: &WorkflowTrigger, tasks: GeneratedTasks) -> Result<(), HandleError> {
        self.plans
            .save_tasks(&trigger.slug, &tasks)
            .await
            .map_err(|e| HandleError::Retryable(format!("task persistence failed: {e}")))?;

        let value = serde_json::to_value(&tasks).map_err(|e| HandleError::Fatal(e.to_string()))?;
        deliver_success(
            &self.backend,
            &self.workflow,
            trigger,
            SUCCESS_PHASE,
            vec![("tasks".to_string(), value.clone())],
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
