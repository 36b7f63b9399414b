//! Plexuses: bounded collections of repositories that discovery runs over

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// A discovery scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plexus {
    pub id: String,
    /// Unique, human-chosen name
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Plexus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A repository registered in a plexus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Caller-chosen repository identifier
    pub repo_id: String,
    pub name: String,
    /// Local checkout used by the filesystem repository source
    pub local_path: Option<PathBuf>,
    pub added_at: DateTime<Utc>,
}

impl RepoRef {
    pub fn new(repo_id: impl Into<String>) -> Self {
        let repo_id = repo_id.into();
        Self {
            name: repo_id.clone(),
            repo_id,
            local_path: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }
}

/// Catalog of plexuses and their member repositories
#[async_trait]
pub trait ScopeCatalog: Send + Sync {
    async fn create_plexus(&self, plexus: &Plexus) -> Result<()>;

    /// Find a plexus by ID or by name
    async fn find_plexus(&self, id_or_name: &str) -> Result<Option<Plexus>>;

    async fn list_plexuses(&self) -> Result<Vec<Plexus>>;

    /// Add (or replace) a repository in a plexus
    async fn add_repository(&self, plexus_id: &str, repo: &RepoRef) -> Result<()>;

    /// Remove a repository; returns false if it was not a member
    async fn remove_repository(&self, plexus_id: &str, repo_id: &str) -> Result<bool>;

    /// Member repositories, ordered by repository ID
    async fn list_repositories(&self, plexus_id: &str) -> Result<Vec<RepoRef>>;
}
