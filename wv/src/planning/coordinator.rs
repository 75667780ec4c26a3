//! Plan coordinator
//!
//! One coordination call: decide focus areas, fan out a worker planner
//! per focus under a shared deadline, collect whatever survives, and
//! synthesize a single plan. The session registry tracks progress and is
//! cleaned up however the call exits.

use std::sync::Arc;
use std::time::Duration;

use eyre::{Result, bail};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::builder::ContextBuilder;
use crate::config::PlannerConfig;
use crate::domain::{
    ContextBuildRequest, FocusArea, PlanDraft, PlanSession, PlannerState, PlannerStatus, SessionStatus, TaskType,
    WorkflowTrigger,
};
use crate::generate::extract_json;
use crate::llm::{CompletionRequest, LlmClient};

use super::{PlanManager, SessionStore};

const FOCUS_TEMPLATE: &str = r#"{
  "focus_areas": [
    {"area": "data-model", "description": "schema and persistence", "hints": ["keep it minimal"]}
  ]
}"#;

const PLAN_TEMPLATE: &str = r#"{
  "goal": "what this plan achieves",
  "context": "why, and what exists today",
  "scope": {"include": ["src/auth"], "exclude": ["docs"], "do_not_touch": ["migrations"]}
}"#;

#[derive(Debug, Deserialize)]
struct FocusOutput {
    focus_areas: Vec<FocusArea>,
}

/// Removes the session whichever way coordination exits
struct SessionGuard<'a> {
    store: &'a SessionStore,
    session_id: String,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.store.remove(&self.session_id);
    }
}

/// Coordinates concurrent worker planners for one planning trigger
pub struct PlanCoordinator {
    llm: Arc<dyn LlmClient>,
    builder: Arc<ContextBuilder>,
    plans: Arc<dyn PlanManager>,
    sessions: SessionStore,
    config: PlannerConfig,
    capability: String,
}

impl PlanCoordinator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        builder: Arc<ContextBuilder>,
        plans: Arc<dyn PlanManager>,
        config: PlannerConfig,
        capability: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            builder,
            plans,
            sessions: SessionStore::new(),
            config,
            capability: capability.into(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run one full coordination and persist the synthesized plan
    pub async fn coordinate(&self, trigger: &WorkflowTrigger) -> Result<PlanDraft> {
        let session_id = format!("sess-{}", Uuid::new_v4());
        self.sessions.insert(PlanSession::new(&session_id, &trigger.slug));
        let _guard = SessionGuard {
            store: &self.sessions,
            session_id: session_id.clone(),
        };

        // Focus areas: explicit from the trigger, or derived by the LLM.
        let mut focuses = if trigger.focus_areas.is_empty() {
            self.determine_focus_areas(trigger).await
        } else {
            trigger.focus_areas.clone()
        };

        let mut limit = self.config.max_concurrent_planners.max(1);
        if trigger.max_planners > 0 {
            limit = limit.min(trigger.max_planners);
        }
        focuses.truncate(limit);
        info!(session_id = %session_id, focuses = focuses.len(), "spawning planners");

        // Fan out one planner per focus.
        self.sessions.set_status(&session_id, SessionStatus::Planning);
        let (tx, mut rx) = mpsc::channel::<(String, Result<PlanDraft, String>)>(focuses.len());
        let mut expected = 0;
        for focus in &focuses {
            let planner_id = format!("planner-{}", Uuid::new_v4());
            self.sessions
                .add_planner(&session_id, &planner_id, PlannerState::pending(focus.clone()));
            self.sessions
                .set_planner_status(&session_id, &planner_id, PlannerStatus::Running);

            let llm = self.llm.clone();
            let tx = tx.clone();
            let focus = focus.clone();
            let prompt = trigger.prompt.clone();
            let capability = self.capability.clone();
            tokio::spawn(async move {
                let outcome = run_planner(llm, capability, &focus, &prompt).await;
                // The receiver may be gone if coordination timed out;
                // dropping the result is the correct leak-free behavior.
                let _ = tx.send((planner_id, outcome)).await;
            });
            expected += 1;
        }
        drop(tx);

        // Collect until every focus is accounted for or the fan-out
        // deadline fires.
        let deadline = Duration::from_secs(self.config.planner_timeout_secs) * expected as u32;
        let mut drafts: Vec<(String, PlanDraft)> = Vec::new();
        let mut failures = 0;
        let collect = async {
            while drafts.len() + failures < expected {
                match rx.recv().await {
                    Some((planner_id, Ok(draft))) => {
                        let area = self
                            .sessions
                            .get(&session_id)
                            .and_then(|s| s.planners.get(&planner_id).map(|p| p.focus_area.area.clone()))
                            .unwrap_or_default();
                        self.sessions.record_planner_result(&session_id, &planner_id, Ok(draft.clone()));
                        drafts.push((area, draft));
                    }
                    Some((planner_id, Err(error))) => {
                        warn!(session_id = %session_id, planner_id = %planner_id, %error, "planner failed");
                        self.sessions.record_planner_result(&session_id, &planner_id, Err(error));
                        failures += 1;
                    }
                    None => break,
                }
            }
        };
        if tokio::time::timeout(deadline, collect).await.is_err() {
            bail!("plan coordination timed out after {deadline:?} with {} of {expected} planners done", drafts.len());
        }

        if drafts.is_empty() {
            bail!("all {expected} planners failed");
        }

        // Synthesize.
        self.sessions.set_status(&session_id, SessionStatus::Synthesizing);
        let plan = if drafts.len() == 1 {
            drafts.remove(0).1
        } else {
            match self.synthesize(trigger, &drafts).await {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(error = %e, "LLM synthesis failed, using deterministic merge");
                    simple_merge(&drafts)
                }
            }
        };

        self.plans.save_plan(&trigger.slug, &plan).await?;
        self.sessions.set_status(&session_id, SessionStatus::Complete);
        info!(session_id = %session_id, slug = %trigger.slug, "plan saved");
        Ok(plan)
    }

    /// Ask the LLM to decompose the prompt into focus areas
    ///
    /// Any failure collapses to the single "general" focus.
    async fn determine_focus_areas(&self, trigger: &WorkflowTrigger) -> Vec<FocusArea> {
        let context = self
            .builder
            .build(&ContextBuildRequest {
                request_id: format!("coord-{}", Uuid::new_v4()),
                task_type: TaskType::Planning,
                workflow_id: trigger.loop_id.clone(),
                topic: trigger.title.clone(),
                plan_slug: trigger.slug.clone(),
                ..Default::default()
            })
            .await;

        let mut user = String::new();
        if context.error.is_empty() {
            for (key, doc) in &context.documents {
                user.push_str(&format!("### {key}\n{doc}\n\n"));
            }
        }
        user.push_str("## Prompt\n");
        user.push_str(&trigger.prompt);
        user.push_str(&format!("\n\nTemplate:\n{FOCUS_TEMPLATE}"));

        let request = CompletionRequest::for_capability(
            &self.capability,
            "Split this planning prompt into independent focus areas. Respond with JSON only.",
            user,
        );

        let parsed = match self.llm.complete(request).await {
            Ok(response) => extract_json(&response.content)
                .and_then(|json| serde_json::from_str::<FocusOutput>(&json).ok())
                .map(|out| out.focus_areas),
            Err(e) => {
                warn!(error = %e, "focus decomposition call failed");
                None
            }
        };

        match parsed {
            Some(focuses) if !focuses.is_empty() => focuses,
            _ => {
                debug!("falling back to single general focus");
                vec![FocusArea::general()]
            }
        }
    }

    /// Merge several drafts with the LLM
    async fn synthesize(&self, trigger: &WorkflowTrigger, drafts: &[(String, PlanDraft)]) -> Result<PlanDraft> {
        let mut user = String::from("Merge these focused plans into one coherent plan. Respond with JSON only.\n\n");
        for (area, draft) in drafts {
            user.push_str(&format!("## {area}\n{}\n\n", serde_json::to_string_pretty(draft)?));
        }
        user.push_str(&format!("## Original prompt\n{}\n\nTemplate:\n{PLAN_TEMPLATE}", trigger.prompt));

        let request = CompletionRequest::for_capability(&self.capability, "You merge software plans.", user);
        let response = self.llm.complete(request).await?;
        let json = extract_json(&response.content).ok_or_else(|| eyre::eyre!("synthesis produced no JSON"))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// One worker planner: prompt the LLM for a focused plan draft
async fn run_planner(
    llm: Arc<dyn LlmClient>,
    capability: String,
    focus: &FocusArea,
    prompt: &str,
) -> Result<PlanDraft, String> {
    let mut user = format!(
        "Focus area: {}\n{}\n\nPlan ONLY this focus area of the following prompt.\n\n{prompt}\n\nTemplate:\n{PLAN_TEMPLATE}",
        focus.area, focus.description
    );
    if !focus.hints.is_empty() {
        user.push_str("\n\nHints:\n");
        for hint in &focus.hints {
            user.push_str(&format!("- {hint}\n"));
        }
    }

    let request = CompletionRequest::for_capability(&capability, "You write focused software plans as JSON.", user);
    let response = llm.complete(request).await.map_err(|e| e.to_string())?;
    let json = extract_json(&response.content).ok_or_else(|| "planner produced no JSON".to_string())?;
    serde_json::from_str(&json).map_err(|e| e.to_string())
}

/// Deterministic fallback merge
///
/// Goals and contexts concatenate with their focus tags; scope lists
/// union in first-seen order.
pub fn simple_merge(drafts: &[(String, PlanDraft)]) -> PlanDraft {
    let mut merged = PlanDraft::default();
    let mut goals = Vec::new();
    let mut contexts = Vec::new();

    for (area, draft) in drafts {
        if !draft.goal.is_empty() {
            goals.push(format!("[{area}] {}", draft.goal));
        }
        if !draft.context.is_empty() {
            contexts.push(format!("[{area}] {}", draft.context));
        }
        union_into(&mut merged.scope.include, &draft.scope.include);
        union_into(&mut merged.scope.exclude, &draft.scope.exclude);
        union_into(&mut merged.scope.do_not_touch, &draft.scope.do_not_touch);
    }

    merged.goal = goals.join("\n");
    merged.context = contexts.join("\n");
    merged
}

fn union_into(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}
