//! Plan coordination
//!
//! Decomposes a planning trigger into focus areas, fans out concurrent
//! worker planners, and synthesizes their drafts into one plan.

mod coordinator;
mod session;

pub use coordinator::{PlanCoordinator, simple_merge};
pub use session::SessionStore;

use async_trait::async_trait;
use eyre::Result;

use crate::domain::{GeneratedPhases, GeneratedTasks, PlanDraft};

/// External collaborator that persists plans and their generated artifacts
#[async_trait]
pub trait PlanManager: Send + Sync {
    async fn save_plan(&self, slug: &str, draft: &PlanDraft) -> Result<()>;

    async fn save_phases(&self, slug: &str, phases: &GeneratedPhases) -> Result<()>;

    async fn save_tasks(&self, slug: &str, tasks: &GeneratedTasks) -> Result<()>;
}

/// In-process plan manager, for tests and the one-shot CLI path
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryPlanManager {
        plans: Mutex<HashMap<String, PlanDraft>>,
        phases: Mutex<HashMap<String, GeneratedPhases>>,
        tasks: Mutex<HashMap<String, GeneratedTasks>>,
    }

    impl InMemoryPlanManager {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(&self, slug: &str) -> Option<PlanDraft> {
            self.plans.lock().unwrap().get(slug).cloned()
        }

        pub fn get_phases(&self, slug: &str) -> Option<GeneratedPhases> {
            self.phases.lock().unwrap().get(slug).cloned()
        }

        pub fn get_tasks(&self, slug: &str) -> Option<GeneratedTasks> {
            self.tasks.lock().unwrap().get(slug).cloned()
        }
    }

    #[async_trait]
    impl PlanManager for InMemoryPlanManager {
        async fn save_plan(&self, slug: &str, draft: &PlanDraft) -> Result<()> {
            self.plans.lock().unwrap().insert(slug.to_string(), draft.clone());
            Ok(())
        }

        async fn save_phases(&self, slug: &str, phases: &GeneratedPhases) -> Result<()> {
            self.phases.lock().unwrap().insert(slug.to_string(), phases.clone());
            Ok(())
        }

        async fn save_tasks(&self, slug: &str, tasks: &GeneratedTasks) -> Result<()> {
            self.tasks.lock().unwrap().insert(slug.to_string(), tasks.clone());
            Ok(())
        }
    }
}
