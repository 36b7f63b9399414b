//! SQLite implementation of the ScopeCatalog

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use super::parse_timestamp;
use crate::domain::{Plexus, RepoRef, ScopeCatalog};
use crate::error::{Error, Result};

/// SQLite-backed catalog of plexuses and their repositories
#[derive(Clone)]
pub struct SqliteScopeCatalog {
    pool: SqlitePool,
}

impl SqliteScopeCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn plexus_exists(&self, plexus_id: &str) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM plexuses WHERE id = ?")
            .bind(plexus_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl ScopeCatalog for SqliteScopeCatalog {
    async fn create_plexus(&self, plexus: &Plexus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO plexuses (id, name, description, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&plexus.id)
        .bind(&plexus.name)
        .bind(&plexus.description)
        .bind(plexus.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::InvalidInput(format!("Plexus '{}' already exists", plexus.name))
            }
            _ => Error::DatabaseError(e),
        })?;

        info!(plexus_id = %plexus.id, name = %plexus.name, "Plexus created");
        Ok(())
    }

    async fn find_plexus(&self, id_or_name: &str) -> Result<Option<Plexus>> {
        let row: Option<PlexusRow> =
            sqlx::query_as("SELECT * FROM plexuses WHERE id = ? OR name = ? LIMIT 1")
                .bind(id_or_name)
                .bind(id_or_name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(PlexusRow::into_plexus).transpose()
    }

    async fn list_plexuses(&self) -> Result<Vec<Plexus>> {
        let rows: Vec<PlexusRow> = sqlx::query_as("SELECT * FROM plexuses ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PlexusRow::into_plexus).collect()
    }

    async fn add_repository(&self, plexus_id: &str, repo: &RepoRef) -> Result<()> {
        if !self.plexus_exists(plexus_id).await? {
            return Err(Error::ScopeNotFound(plexus_id.to_string()));
        }

        let local_path = repo
            .local_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        sqlx::query(
            r#"
            INSERT INTO plexus_repositories (plexus_id, repo_id, name, local_path, added_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(plexus_id, repo_id) DO UPDATE SET
                name = excluded.name,
                local_path = excluded.local_path
            "#,
        )
        .bind(plexus_id)
        .bind(&repo.repo_id)
        .bind(&repo.name)
        .bind(&local_path)
        .bind(repo.added_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(plexus_id = %plexus_id, repo_id = %repo.repo_id, "Repository added");
        Ok(())
    }

    async fn remove_repository(&self, plexus_id: &str, repo_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM plexus_repositories WHERE plexus_id = ? AND repo_id = ?")
                .bind(plexus_id)
                .bind(repo_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_repositories(&self, plexus_id: &str) -> Result<Vec<RepoRef>> {
        let rows: Vec<RepoRow> = sqlx::query_as(
            "SELECT * FROM plexus_repositories WHERE plexus_id = ? ORDER BY repo_id",
        )
        .bind(plexus_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RepoRow::into_repo).collect()
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct PlexusRow {
    id: String,
    name: String,
    description: Option<String>,
    created_at: String,
}

impl PlexusRow {
    fn into_plexus(self) -> Result<Plexus> {
        Ok(Plexus {
            created_at: parse_timestamp("plexuses.created_at", &self.created_at)?,
            id: self.id,
            name: self.name,
            description: self.description,
        })
    }
}

#[derive(Debug, FromRow)]
struct RepoRow {
    #[allow(dead_code)]
    plexus_id: String,
    repo_id: String,
    name: String,
    local_path: Option<String>,
    added_at: String,
}

impl RepoRow {
    fn into_repo(self) -> Result<RepoRef> {
        Ok(RepoRef {
            added_at: parse_timestamp("plexus_repositories.added_at", &self.added_at)?,
            repo_id: self.repo_id,
            name: self.name,
            local_path: self.local_path.map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn setup() -> SqliteScopeCatalog {
        let db = Database::in_memory().await.expect("Failed to create test database");
        SqliteScopeCatalog::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_create_and_find_plexus() {
        let catalog = setup().await;
        let plexus = Plexus::new("design-tools").with_description("Design tooling");
        catalog.create_plexus(&plexus).await.unwrap();

        let by_id = catalog.find_plexus(&plexus.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "design-tools");
        let by_name = catalog.find_plexus("design-tools").await.unwrap().unwrap();
        assert_eq!(by_name.id, plexus.id);
        assert_eq!(by_name.description.as_deref(), Some("Design tooling"));

        assert!(catalog.find_plexus("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_plexus_name_rejected() {
        let catalog = setup().await;
        catalog.create_plexus(&Plexus::new("tools")).await.unwrap();

        let err = catalog.create_plexus(&Plexus::new("tools")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(catalog.list_plexuses().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repositories_ordered_and_replaced() {
        let catalog = setup().await;
        let plexus = Plexus::new("tools");
        catalog.create_plexus(&plexus).await.unwrap();

        catalog
            .add_repository(&plexus.id, &RepoRef::new("zeta").with_local_path("/src/zeta"))
            .await
            .unwrap();
        catalog.add_repository(&plexus.id, &RepoRef::new("alpha")).await.unwrap();
        catalog
            .add_repository(&plexus.id, &RepoRef::new("alpha").with_name("Alpha"))
            .await
            .unwrap();

        let repos = catalog.list_repositories(&plexus.id).await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].repo_id, "alpha");
        assert_eq!(repos[0].name, "Alpha");
        assert_eq!(repos[1].local_path, Some(PathBuf::from("/src/zeta")));

        assert!(catalog.remove_repository(&plexus.id, "zeta").await.unwrap());
        assert!(!catalog.remove_repository(&plexus.id, "zeta").await.unwrap());
        assert_eq!(catalog.list_repositories(&plexus.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_repository_to_unknown_plexus() {
        let catalog = setup().await;
        let err = catalog
            .add_repository("nope", &RepoRef::new("alpha"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ScopeNotFound(_)));
    }
}
