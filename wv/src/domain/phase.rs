//! Generated phase and task artifacts

use serde::{Deserialize, Serialize};

/// A development phase produced by the phase generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 1-based sequence numbers of phases this one depends on
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

/// The validated output of one phase generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPhases {
    pub phases: Vec<PhaseSpec>,
}

/// What kind of work a task is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Implement,
    Test,
    Document,
    Review,
    Refactor,
}

/// A BDD-style acceptance criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub given: String,
    pub when: String,
    pub then: String,
}

/// A typed task produced by the task generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub phase_id: Option<String>,
}

/// The validated output of one task generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTasks {
    pub tasks: Vec<TaskSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_serde() {
        let t: TaskKind = serde_json::from_str("\"implement\"").unwrap();
        assert_eq!(t, TaskKind::Implement);
        assert!(serde_json::from_str::<TaskKind>("\"deploy\"").is_err());
    }

    #[test]
    fn test_task_spec_defaults() {
        let json = r#"{"description": "write the parser", "type": "implement"}"#;
        let task: TaskSpec = serde_json::from_str(json).unwrap();
        assert!(task.depends_on.is_empty());
        assert!(task.files.is_empty());
        assert!(task.phase_id.is_none());
    }

    #[test]
    fn test_phase_spec_parse() {
        let json = r#"{"name": "Scaffolding", "description": "set up the crate", "depends_on": []}"#;
        let phase: PhaseSpec = serde_json::from_str(json).unwrap();
        assert_eq!(phase.name, "Scaffolding");
        assert!(phase.depends_on.is_empty());
    }
}
