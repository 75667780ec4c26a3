//! Filesystem gatherer

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// Filesystem locations tried when the graph has no architecture docs
pub const FALLBACK_ARCH_DOCS: [&str; 4] = [
    "docs/architecture.md",
    "docs/design.md",
    "ARCHITECTURE.md",
    "README.md",
];

/// Convention files considered during review
pub const CONVENTION_FILES: [&str; 4] = [
    ".editorconfig",
    "CONTRIBUTING.md",
    "docs/conventions.md",
    "rustfmt.toml",
];

/// Read-side adapter over the project working directory
pub struct FilesGatherer {
    root: PathBuf,
}

impl FilesGatherer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read one file relative to the root; missing or unreadable is `None`
    pub async fn read(&self, relative: &str) -> Option<String> {
        let path = self.root.join(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file not readable");
                None
            }
        }
    }

    /// Relative paths of all files under the root, sorted
    ///
    /// The `.git` and `target` directories are never listed. Dotfiles are
    /// included; callers that need them filtered do so themselves.
    pub fn file_tree(&self) -> Vec<String> {
        let mut paths: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                name != ".git" && name != "target"
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        paths.sort();
        paths
    }

    /// Test files related to a set of changed files
    ///
    /// A file is related when its path mentions "test" and shares a stem
    /// with one of the changed files.
    pub fn related_tests(&self, changed: &[String]) -> Vec<String> {
        let stems: Vec<String> = changed
            .iter()
            .filter_map(|f| Path::new(f).file_stem().map(|s| s.to_string_lossy().to_lowercase()))
            .collect();

        self.file_tree()
            .into_iter()
            .filter(|path| {
                let lower = path.to_lowercase();
                lower.contains("test") && stems.iter().any(|stem| !stem.is_empty() && lower.contains(stem.as_str()))
            })
            .collect()
    }

    /// Architecture docs from the fixed fallback list, in list order
    pub async fn fallback_arch_docs(&self) -> Vec<(String, String)> {
        let reads = futures::future::join_all(FALLBACK_ARCH_DOCS.iter().map(|candidate| self.read(candidate)));
        FALLBACK_ARCH_DOCS
            .iter()
            .zip(reads.await)
            .filter_map(|(candidate, content)| content.map(|c| (candidate.to_string(), c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fixture() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("src/auth.rs"), "pub fn login() {}").unwrap();
        fs::write(dir.path().join("tests/auth_test.rs"), "#[test] fn t() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# readme").unwrap();
        fs::write(dir.path().join(".gitignore"), "target").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_read_existing_and_missing() {
        let dir = fixture();
        let gatherer = FilesGatherer::new(dir.path());
        assert_eq!(gatherer.read("README.md").await.unwrap(), "# readme");
        assert!(gatherer.read("missing.md").await.is_none());
    }

    #[test]
    fn test_file_tree_sorted_and_relative() {
        let dir = fixture();
        let gatherer = FilesGatherer::new(dir.path());
        let tree = gatherer.file_tree();
        assert_eq!(
            tree,
            vec![".gitignore", "README.md", "src/auth.rs", "tests/auth_test.rs"]
        );
    }

    #[test]
    fn test_related_tests_by_stem() {
        let dir = fixture();
        let gatherer = FilesGatherer::new(dir.path());
        let related = gatherer.related_tests(&["src/auth.rs".to_string()]);
        assert_eq!(related, vec!["tests/auth_test.rs"]);

        let related = gatherer.related_tests(&["src/billing.rs".to_string()]);
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_arch_docs() {
        let dir = fixture();
        let gatherer = FilesGatherer::new(dir.path());
        let docs = gatherer.fallback_arch_docs().await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].0, "README.md");
    }
}
