//! Version control gatherer

use std::path::PathBuf;

use eyre::{Context, Result, bail};
use tracing::debug;

use crate::budget::estimate_tokens;

/// Read-side adapter over the project's git repository
pub struct VcsGatherer {
    repo_root: PathBuf,
}

impl VcsGatherer {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Files changed in the given ref or range
    pub async fn changed_files(&self, git_ref: &str) -> Result<Vec<String>> {
        let output = tokio::process::Command::new("git")
            .args(["diff", "--name-only", git_ref])
            .current_dir(&self.repo_root)
            .output()
            .await
            .context("Failed to run git diff --name-only")?;

        if !output.status.success() {
            bail!("git diff --name-only failed: {}", String::from_utf8_lossy(&output.stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Full unified diff for the given ref or range
    pub async fn diff(&self, git_ref: &str) -> Result<String> {
        let output = tokio::process::Command::new("git")
            .args(["diff", git_ref])
            .current_dir(&self.repo_root)
            .output()
            .await
            .context("Failed to run git diff")?;

        if !output.status.success() {
            bail!("git diff failed: {}", String::from_utf8_lossy(&output.stderr));
        }

        debug!(git_ref, bytes = output.stdout.len(), "collected diff");
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Clip a unified diff to a token budget without splitting a file's hunk
///
/// Whole per-file sections are kept in order until the next one would not
/// fit. Returns the kept diff and whether anything was dropped.
pub fn truncate_diff_at_file_boundaries(diff: &str, max_tokens: usize) -> (String, bool) {
    if estimate_tokens(diff) <= max_tokens {
        return (diff.to_string(), false);
    }

    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in diff.lines() {
        if line.starts_with("diff --git ") && !current.is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        sections.push(current);
    }

    let mut kept = String::new();
    let mut dropped = false;
    for section in sections {
        if estimate_tokens(&kept) + estimate_tokens(&section) > max_tokens {
            dropped = true;
            break;
        }
        kept.push_str(&section);
    }

    (kept, dropped)
}
