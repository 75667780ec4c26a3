//! Phase generation

use std::sync::Arc;

use crate::domain::{GeneratedPhases, PhaseSpec};
use crate::llm::{CompletionRequest, LlmClient};

use super::{GenerateError, generate_with_retry};

const PHASES_TEMPLATE: &str = r#"{
  "phases": [
    {"name": "Foundations", "description": "set up the data model", "depends_on": []},
    {"name": "API", "description": "expose the endpoints", "depends_on": [1]}
  ]
}"#;

const SYSTEM_PROMPT: &str = "You are a software architect breaking work into sequential \
     development phases. Respond with JSON only. Phases are numbered from 1 in order; \
     depends_on lists the numbers of earlier phases a phase builds on.";

/// Check the structural invariants of a phase list
///
/// At least two phases; dependencies are 1-based sequence numbers that
/// reference strictly earlier phases.
pub fn validate_phase_dependencies(phases: &[PhaseSpec]) -> Result<(), String> {
    if phases.len() < 2 {
        return Err(format!("expected at least 2 phases, got {}", phases.len()));
    }

    for (index, phase) in phases.iter().enumerate() {
        let seq = index + 1;
        for &dep in &phase.depends_on {
            if dep == 0 || dep > phases.len() {
                return Err(format!("phase {seq} depends on {dep}, which is out of range"));
            }
            if dep == seq {
                return Err(format!("phase {seq} depends on itself"));
            }
            if dep > seq {
                return Err(format!("phase {seq} has a forward dependency on phase {dep}"));
            }
        }
    }
    Ok(())
}

/// Format-retrying phase generator
pub struct PhaseGenerator {
    llm: Arc<dyn LlmClient>,
    capability: String,
}

impl PhaseGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, capability: impl Into<String>) -> Self {
        Self {
            llm,
            capability: capability.into(),
        }
    }

    /// Generate validated phases for a prompt, enriched with context and
    /// the standards requirements
    pub async fn generate(
        &self,
        prompt: &str,
        context: &str,
        sop_requirements: &[String],
    ) -> Result<GeneratedPhases, GenerateError> {
        let mut user = String::new();
        if !context.is_empty() {
            user.push_str("## Context\n");
            user.push_str(context);
            user.push_str("\n\n");
        }
        if !sop_requirements.is_empty() {
            user.push_str("## Project rules\n");
            for rule in sop_requirements {
                user.push_str("- ");
                user.push_str(rule);
                user.push('\n');
            }
            user.push('\n');
        }
        user.push_str("## Work to phase\n");
        user.push_str(prompt);

        let request = CompletionRequest::for_capability(&self.capability, SYSTEM_PROMPT, user);

        generate_with_retry(&self.llm, request, PHASES_TEMPLATE, |json| {
            let parsed: GeneratedPhases = serde_json::from_str(json).map_err(|e| e.to_string())?;
            validate_phase_dependencies(&parsed.phases)?;
            Ok(parsed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionResponse;
    use crate::llm::client::mock::MockLlmClient;

    fn phase(name: &str, depends_on: Vec<usize>) -> PhaseSpec {
        PhaseSpec {
            name: name.into(),
            description: String::new(),
            depends_on,
        }
    }

    #[test]
    fn test_accepts_valid_chain() {
        let phases = vec![phase("a", vec![]), phase("b", vec![1]), phase("c", vec![1, 2])];
        assert!(validate_phase_dependencies(&phases).is_ok());
    }

    #[test]
    fn test_rejects_single_phase() {
        assert!(validate_phase_dependencies(&[phase("only", vec![])]).is_err());
    }

    #[test]
    fn test_rejects_self_dependency() {
        let phases = vec![phase("a", vec![]), phase("b", vec![2])];
        let err = validate_phase_dependencies(&phases).unwrap_err();
        assert!(err.contains("itself"));
    }

    #[test]
    fn test_rejects_forward_dependency() {
        let phases = vec![phase("a", vec![2]), phase("b", vec![])];
        let err = validate_phase_dependencies(&phases).unwrap_err();
        assert!(err.contains("forward"));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let phases = vec![phase("a", vec![]), phase("b", vec![5])];
        let err = validate_phase_dependencies(&phases).unwrap_err();
        assert!(err.contains("out of range"));

        let phases = vec![phase("a", vec![]), phase("b", vec![0])];
        assert!(validate_phase_dependencies(&phases).is_err());
    }

    #[test]
    fn test_accepts_empty_dependency_lists() {
        let phases = vec![phase("a", vec![]), phase("b", vec![])];
        assert!(validate_phase_dependencies(&phases).is_ok());
    }

    #[tokio::test]
    async fn test_generate_retries_prose_then_succeeds() {
        let valid = r#"```json
{"phases": [
  {"name": "Model", "description": "d", "depends_on": []},
  {"name": "API", "description": "d", "depends_on": [1]},
  {"name": "UI", "description": "d", "depends_on": [2]}
]}
```"#;
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new(vec![
            CompletionResponse::text("Here's my thinking about phases..."),
            CompletionResponse::text(valid),
        ]));

        let generator = PhaseGenerator::new(llm, "planning");
        let phases = generator.generate("add auth", "", &[]).await.unwrap();
        assert_eq!(phases.phases.len(), 3);
    }
}
