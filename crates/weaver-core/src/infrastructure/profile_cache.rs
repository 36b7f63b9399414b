//! SQLite implementation of the ProfileCache

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::domain::RepoProfile;
use crate::error::Result;
use crate::profiler::ProfileCache;

/// Profile cache stored in the `profile_cache` table
#[derive(Clone)]
pub struct SqliteProfileCache {
    pool: SqlitePool,
}

impl SqliteProfileCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Drop every cached profile of a repository; returns the number removed
    pub async fn invalidate(&self, repo_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM profile_cache WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProfileCache for SqliteProfileCache {
    async fn get(&self, repo_id: &str, input_hash: &str) -> Result<Option<RepoProfile>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT profile_json FROM profile_cache WHERE repo_id = ? AND input_hash = ?",
        )
        .bind(repo_id)
        .bind(input_hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, repo_id: &str, input_hash: &str, profile: &RepoProfile) -> Result<()> {
        let profile_json = serde_json::to_string(profile)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM profile_cache WHERE repo_id = ? AND input_hash != ?")
            .bind(repo_id)
            .bind(input_hash)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO profile_cache (repo_id, input_hash, profile_json, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(repo_id, input_hash) DO UPDATE SET
                profile_json = excluded.profile_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(repo_id)
        .bind(input_hash)
        .bind(&profile_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(repo_id = %repo_id, "Profile cached");
        Ok(())
    }
}
