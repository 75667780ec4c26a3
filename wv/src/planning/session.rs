//! In-memory plan session registry

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::domain::{PlanSession, PlannerState, PlannerStatus, SessionStatus};

/// Shared registry of live coordination sessions
///
/// Coarse-grained: every operation takes the whole lock. Sessions exist
/// only while a coordination call is in flight.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, PlanSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: PlanSession) {
        self.sessions.write().unwrap().insert(session.session_id.clone(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<PlanSession> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.write().unwrap().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }

    pub fn set_status(&self, session_id: &str, status: SessionStatus) {
        if let Some(session) = self.sessions.write().unwrap().get_mut(session_id) {
            session.status = status;
            if status == SessionStatus::Complete {
                session.completed_at = Some(Utc::now());
            }
        }
    }

    pub fn add_planner(&self, session_id: &str, planner_id: &str, state: PlannerState) {
        if let Some(session) = self.sessions.write().unwrap().get_mut(session_id) {
            session.planners.insert(planner_id.to_string(), state);
        }
    }

    pub fn set_planner_status(&self, session_id: &str, planner_id: &str, status: PlannerStatus) {
        if let Some(session) = self.sessions.write().unwrap().get_mut(session_id)
            && let Some(planner) = session.planners.get_mut(planner_id)
        {
            planner.status = status;
            match status {
                PlannerStatus::Running => planner.started_at = Some(Utc::now()),
                PlannerStatus::Completed | PlannerStatus::Failed => planner.completed_at = Some(Utc::now()),
                PlannerStatus::Pending => {}
            }
        }
    }

    pub fn record_planner_result(
        &self,
        session_id: &str,
        planner_id: &str,
        result: Result<crate::domain::PlanDraft, String>,
    ) {
        if let Some(session) = self.sessions.write().unwrap().get_mut(session_id)
            && let Some(planner) = session.planners.get_mut(planner_id)
        {
            planner.completed_at = Some(Utc::now());
            match result {
                Ok(draft) => {
                    planner.status = PlannerStatus::Completed;
                    planner.result = Some(draft);
                }
                Err(error) => {
                    planner.status = PlannerStatus::Failed;
                    planner.error = Some(error);
                }
            }
        }
    }
}
