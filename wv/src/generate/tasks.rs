//! Task generation
//!
//! Tasks come back typed with BDD acceptance criteria. After parsing,
//! dependency references are normalized to canonical entity ids and task
//! file lists are checked against the real file tree, correcting near
//! misses and dropping hallucinated paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::domain::{GeneratedTasks, TaskSpec};
use crate::llm::{CompletionRequest, LlmClient};

use super::{GenerateError, generate_with_retry};

const TASKS_TEMPLATE: &str = r#"{
  "tasks": [
    {
      "description": "Add the session store",
      "type": "implement",
      "depends_on": [],
      "acceptance_criteria": [
        {"given": "a logged-in user", "when": "the session expires", "then": "a new login is required"}
      ],
      "files": ["src/session.rs"]
    }
  ]
}"#;

const SYSTEM_PROMPT: &str = "You decompose a development phase into concrete tasks. Respond \
     with JSON only. Task types: implement, test, document, review, refactor. Every task \
     carries given/when/then acceptance criteria and the files it touches.";

static TRAILING_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(\d+)$").unwrap());

/// Normalize one dependency reference
///
/// `{slug}` placeholders are substituted, short prefixes are mapped to
/// the unique canonical id they abbreviate, and a trailing `.N` sequence
/// separator becomes `-N`. Idempotent under re-application.
pub fn normalize_depends_on(dep: &str, slug: &str, known_ids: &[String]) -> String {
    let mut normalized = dep.replace("{slug}", slug);

    normalized = TRAILING_SEQUENCE.replace(&normalized, "-$1").to_string();

    if !known_ids.iter().any(|id| id == &normalized) {
        let mut matches = known_ids.iter().filter(|id| id.starts_with(&normalized));
        if let (Some(only), None) = (matches.next(), matches.next()) {
            normalized = only.clone();
        }
    }

    normalized
}

/// Validate and correct task file lists against the project file tree
///
/// Glob patterns are dropped. Exact paths are kept. Everything else goes
/// through three fuzzy passes: unique basename match, unique stem
/// overlap, unique directory-segment overlap. Paths still unresolved are
/// dropped as hallucinated.
pub fn validate_task_files(tasks: &mut [TaskSpec], file_tree: &[String]) {
    let exact: HashSet<String> = file_tree.iter().map(|p| p.to_lowercase()).collect();
    let mut by_basename: HashMap<String, Vec<&String>> = HashMap::new();
    for path in file_tree {
        if let Some(basename) = path.rsplit('/').next() {
            by_basename.entry(basename.to_lowercase()).or_default().push(path);
        }
    }

    for task in tasks.iter_mut() {
        task.files.retain_mut(|file| {
            if file.contains('*') || file.contains('?') {
                debug!(%file, "dropping glob from task files");
                return false;
            }
            let lower = file.to_lowercase();
            if exact.contains(&lower) {
                return true;
            }
            match fuzzy_correct(&lower, file_tree, &by_basename) {
                Some(corrected) => {
                    debug!(from = %file, to = %corrected, "corrected task file path");
                    *file = corrected;
                    true
                }
                None => {
                    warn!(%file, "dropping hallucinated task file");
                    false
                }
            }
        });
    }
}

fn fuzzy_correct(
    lower: &str,
    file_tree: &[String],
    by_basename: &HashMap<String, Vec<&String>>,
) -> Option<String> {
    // Pass 1: unique basename match.
    if let Some(basename) = lower.rsplit('/').next()
        && let Some(candidates) = by_basename.get(basename)
        && candidates.len() == 1
    {
        return Some(candidates[0].clone());
    }

    // Pass 2: unique one-sided stem overlap.
    let stem = lower.rsplit('/').next().and_then(|b| b.split('.').next()).unwrap_or("");
    if !stem.is_empty() {
        let mut candidates = file_tree.iter().filter(|path| {
            let candidate_stem = path
                .to_lowercase()
                .rsplit('/')
                .next()
                .and_then(|b| b.split('.').next().map(str::to_string))
                .unwrap_or_default();
            !candidate_stem.is_empty() && (candidate_stem.contains(stem) || stem.contains(&candidate_stem))
        });
        if let (Some(only), None) = (candidates.next(), candidates.next()) {
            return Some(only.clone());
        }
    }

    // Pass 3: unique directory-segment overlap.
    let segments: HashSet<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > 1 {
        let mut candidates = file_tree.iter().filter(|path| {
            let candidate_segments: HashSet<String> = path.to_lowercase().split('/').map(str::to_string).collect();
            segments
                .iter()
                .filter(|s| candidate_segments.contains(**s))
                .count()
                >= segments.len() - 1
        });
        if let (Some(only), None) = (candidates.next(), candidates.next()) {
            return Some(only.clone());
        }
    }

    None
}

fn validate_tasks(tasks: &GeneratedTasks) -> Result<(), String> {
    if tasks.tasks.is_empty() {
        return Err("expected at least one task".to_string());
    }
    for (index, task) in tasks.tasks.iter().enumerate() {
        if task.description.trim().is_empty() {
            return Err(format!("task {} has an empty description", index + 1));
        }
        if task.acceptance_criteria.is_empty() {
            return Err(format!("task {} has no acceptance criteria", index + 1));
        }
    }
    Ok(())
}

/// Assign a phase id to every task
///
/// A supplied id is kept when it names a known phase; anything else is
/// replaced round-robin by task order.
pub fn assign_phase_ids(tasks: &mut [TaskSpec], phase_ids: &[String]) {
    if phase_ids.is_empty() {
        return;
    }
    for (index, task) in tasks.iter_mut().enumerate() {
        let keep = task
            .phase_id
            .as_ref()
            .is_some_and(|id| phase_ids.iter().any(|known| known == id));
        if !keep {
            task.phase_id = Some(phase_ids[index % phase_ids.len()].clone());
        }
    }
}

/// Format-retrying task generator
pub struct TaskGenerator {
    llm: Arc<dyn LlmClient>,
    capability: String,
}

impl TaskGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, capability: impl Into<String>) -> Self {
        Self {
            llm,
            capability: capability.into(),
        }
    }

    /// Generate validated tasks, then normalize and file-check them
    #[allow(clippy::too_many_arguments)]
    pub async fn generate(
        &self,
        prompt: &str,
        context: &str,
        sop_requirements: &[String],
        slug: &str,
        known_ids: &[String],
        phase_ids: &[String],
        file_tree: &[String],
    ) -> Result<GeneratedTasks, GenerateError> {
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
        user.push_str("## Work to decompose\n");
        user.push_str(prompt);

        let request = CompletionRequest::for_capability(&self.capability, SYSTEM_PROMPT, user);

        let mut generated = generate_with_retry(&self.llm, request, TASKS_TEMPLATE, |json| {
            let parsed: GeneratedTasks = serde_json::from_str(json).map_err(|e| e.to_string())?;
            validate_tasks(&parsed)?;
            Ok(parsed)
        })
        .await?;

        for task in &mut generated.tasks {
            for dep in &mut task.depends_on {
                *dep = normalize_depends_on(dep, slug, known_ids);
            }
        }
        assign_phase_ids(&mut generated.tasks, phase_ids);
        validate_task_files(&mut generated.tasks, file_tree);

        Ok(generated)
    }
}
