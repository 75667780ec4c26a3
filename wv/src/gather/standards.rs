//! Standards file gatherer
//!
//! Loads the project rule file and renders the severity-sorted preamble.
//! Missing, unreadable, malformed, or empty files all degrade to "no
//! preamble" without error.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::budget::TokenEstimator;
use crate::domain::Constitution;

/// The rendered preamble plus the rule bookkeeping that rides along
#[derive(Debug, Clone, Default)]
pub struct StandardsPreamble {
    /// Severity-sorted, tagged rule text capped at the preamble budget
    pub content: String,

    /// Tokens the rendered content occupies
    pub tokens: usize,

    /// Ids of rules that carried one
    pub sop_ids: Vec<String>,

    /// Raw rule texts, echoed into LLM prompts
    pub requirements: Vec<String>,

    /// Whether the preamble was clipped to its cap
    pub truncated: bool,
}

impl StandardsPreamble {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Loads and formats the standards preamble
pub struct StandardsGatherer {
    path: PathBuf,
    max_tokens: usize,
    estimator: TokenEstimator,
}

impl StandardsGatherer {
    pub fn new(path: impl Into<PathBuf>, max_tokens: usize) -> Self {
        Self {
            path: path.into(),
            max_tokens,
            estimator: TokenEstimator::new(),
        }
    }

    /// Load the rule file, tolerating every failure mode
    pub async fn load(&self) -> Option<Constitution> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "standards file not readable");
                return None;
            }
        };

        let constitution = parse_constitution(&content)?;
        if constitution.rules.is_empty() {
            debug!(path = %self.path.display(), "standards file has no rules");
            return None;
        }
        Some(constitution)
    }

    /// Render the preamble, or an empty default when there are no rules
    pub async fn preamble(&self) -> StandardsPreamble {
        let Some(constitution) = self.load().await else {
            return StandardsPreamble::default();
        };

        let mut lines = Vec::with_capacity(constitution.rules.len());
        let mut sop_ids = Vec::new();
        let mut requirements = Vec::new();
        for rule in constitution.rules_by_severity() {
            lines.push(format!("[{}] {}", rule.severity.tag(), rule.text));
            if let Some(id) = &rule.id {
                sop_ids.push(id.clone());
            }
            requirements.push(rule.text.clone());
        }

        let rendered = format!("Project standards (follow all of these):\n{}", lines.join("\n"));
        let (content, truncated) = self.estimator.truncate_to_tokens(&rendered, self.max_tokens);
        let tokens = self.estimator.estimate(&content);

        StandardsPreamble {
            content,
            tokens,
            sop_ids,
            requirements,
            truncated,
        }
    }
}

/// Parse as JSON first, then YAML
fn parse_constitution(content: &str) -> Option<Constitution> {
    if let Ok(c) = serde_json::from_str::<Constitution>(content) {
        return Some(c);
    }
    match serde_yaml::from_str::<Constitution>(content) {
        Ok(c) => Some(c),
        Err(e) => {
            debug!(error = %e, "standards file is neither valid JSON nor YAML");
            None
        }
    }
}

/// Convenience for callers holding a config path
pub fn standards_path(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}
