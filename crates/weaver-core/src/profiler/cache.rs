//! Profile cache
//!
//! Profiles are transient; the cache only saves oracle calls when a
//! repository's inputs have not changed since it was last profiled.

use async_trait::async_trait;

use crate::domain::RepoProfile;
use crate::error::Result;

/// Cache of repository profiles keyed by (repository, input hash)
#[async_trait]
pub trait ProfileCache: Send + Sync {
    async fn get(&self, repo_id: &str, input_hash: &str) -> Result<Option<RepoProfile>>;

    async fn put(&self, repo_id: &str, input_hash: &str, profile: &RepoProfile) -> Result<()>;
}
