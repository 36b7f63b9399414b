//! Repository content sources
//!
//! The profiler needs at most three inputs per repository: a free-text
//! description document, manifest-style metadata, and the top-level directory
//! names. Where they come from is the [`RepoSource`]'s business.

use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::RepoRef;
use crate::error::Result;

/// Description files tried in order
const DESCRIPTION_FILES: &[&str] = &["README.md", "README", "readme.md", "README.rst", "README.txt"];

/// Manifest files tried in order
const MANIFEST_FILES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "setup.py",
    "pom.xml",
];

/// Maximum description length passed to the oracle
pub const MAX_DESCRIPTION_CHARS: usize = 6000;

/// Maximum manifest length passed to the oracle
pub const MAX_MANIFEST_CHARS: usize = 3000;

/// Maximum number of directory names passed to the oracle
pub const MAX_DIRECTORIES: usize = 50;

/// Provider of raw repository material
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// Free-text description document, if any
    async fn description(&self, repo: &RepoRef) -> Result<Option<String>>;

    /// Manifest-style structured metadata, if any
    async fn manifest(&self, repo: &RepoRef) -> Result<Option<String>>;

    /// Top-level directory names
    async fn top_level_dirs(&self, repo: &RepoRef) -> Result<Vec<String>>;
}

/// Reads a local checkout at `RepoRef::local_path`
#[derive(Debug, Clone, Default)]
pub struct FsRepoSource;

impl FsRepoSource {
    pub fn new() -> Self {
        Self
    }

    async fn first_existing(root: &Path, candidates: &[&str]) -> Result<Option<String>> {
        for name in candidates {
            let path = root.join(name);
            if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                let bytes = tokio::fs::read(&path).await?;
                return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl RepoSource for FsRepoSource {
    async fn description(&self, repo: &RepoRef) -> Result<Option<String>> {
        match &repo.local_path {
            Some(root) => Self::first_existing(root, DESCRIPTION_FILES).await,
            None => Ok(None),
        }
    }

    async fn manifest(&self, repo: &RepoRef) -> Result<Option<String>> {
        match &repo.local_path {
            Some(root) => Self::first_existing(root, MANIFEST_FILES).await,
            None => Ok(None),
        }
    }

    async fn top_level_dirs(&self, repo: &RepoRef) -> Result<Vec<String>> {
        let Some(root) = &repo.local_path else {
            return Ok(Vec::new());
        };

        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                dirs.push(name);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// The gathered, truncated profiler inputs for one repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoInputs {
    pub description: Option<String>,
    pub manifest: Option<String>,
    pub directories: Vec<String>,
}

impl RepoInputs {
    /// Gather inputs from a source; source errors are logged and treated as absent
    pub async fn gather(source: &dyn RepoSource, repo: &RepoRef) -> Self {
        let description = match source.description(repo).await {
            Ok(text) => text,
            Err(e) => {
                warn!(repo_id = %repo.repo_id, error = %e, "Failed to read description");
                None
            }
        };
        let manifest = match source.manifest(repo).await {
            Ok(text) => text,
            Err(e) => {
                warn!(repo_id = %repo.repo_id, error = %e, "Failed to read manifest");
                None
            }
        };
        let directories = match source.top_level_dirs(repo).await {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(repo_id = %repo.repo_id, error = %e, "Failed to list directories");
                Vec::new()
            }
        };

        Self::new(description, manifest, directories)
    }

    /// Build inputs, dropping blank documents and applying the size limits
    pub fn new(
        description: Option<String>,
        manifest: Option<String>,
        mut directories: Vec<String>,
    ) -> Self {
        directories.truncate(MAX_DIRECTORIES);
        Self {
            description: non_blank(description).map(|d| truncate_content(&d, MAX_DESCRIPTION_CHARS)),
            manifest: non_blank(manifest).map(|m| truncate_content(&m, MAX_MANIFEST_CHARS)),
            directories,
        }
    }

    /// Only directory names are available
    pub fn is_directory_only(&self) -> bool {
        self.description.is_none() && self.manifest.is_none()
    }

    /// Nothing at all is available
    pub fn is_empty(&self) -> bool {
        self.is_directory_only() && self.directories.is_empty()
    }

    /// Stable hex SHA-256 of the inputs, used as the profile cache key
    pub fn input_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"weaver-profile-v1\0");
        hasher.update(self.description.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(self.manifest.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(self.directories.join("\n").as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

/// Truncate content to a maximum number of characters
pub(crate) fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content_is_char_safe() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("abcdef", 3), "abc...");
        assert_eq!(truncate_content("ééééé", 2), "éé...");
    }

    #[test]
    fn test_inputs_apply_limits() {
        let dirs: Vec<String> = (0..80).map(|i| format!("dir{:02}", i)).collect();
        let inputs = RepoInputs::new(Some("x".repeat(7000)), Some("   ".into()), dirs);

        assert_eq!(inputs.directories.len(), MAX_DIRECTORIES);
        assert_eq!(
            inputs.description.as_ref().map(|d| d.chars().count()),
            Some(MAX_DESCRIPTION_CHARS + 3)
        );
        assert!(inputs.manifest.is_none());
        assert!(!inputs.is_directory_only());
    }

    #[test]
    fn test_input_hash_changes_with_content() {
        let a = RepoInputs::new(Some("readme".into()), None, vec!["src".into()]);
        let b = RepoInputs::new(Some("readme".into()), None, vec!["src".into()]);
        let c = RepoInputs::new(Some("readme v2".into()), None, vec!["src".into()]);

        assert_eq!(a.input_hash(), b.input_hash());
        assert_ne!(a.input_hash(), c.input_hash());
        assert_eq!(a.input_hash().len(), 64);
    }

    #[tokio::test]
    async fn test_fs_source_reads_checkout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# Drift detector").unwrap();
        std::fs::write(dir.path().join("package.json"), "{\"name\": \"dd\"}").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        let repo = RepoRef::new("dd").with_local_path(dir.path());
        let inputs = RepoInputs::gather(&FsRepoSource::new(), &repo).await;

        assert_eq!(inputs.description.as_deref(), Some("# Drift detector"));
        assert_eq!(inputs.manifest.as_deref(), Some("{\"name\": \"dd\"}"));
        assert_eq!(inputs.directories, vec!["docs".to_string(), "src".to_string()]);
    }

    #[tokio::test]
    async fn test_fs_source_missing_path_is_absent() {
        let repo = RepoRef::new("ghost").with_local_path("/definitely/not/here");
        let inputs = RepoInputs::gather(&FsRepoSource::new(), &repo).await;
        assert!(inputs.is_empty());

        let no_path = RepoRef::new("remote");
        assert!(RepoInputs::gather(&FsRepoSource::new(), &no_path).await.is_empty());
    }
}
