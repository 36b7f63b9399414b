//! SQLite implementation of the WeaveRepository
//!
//! The partial unique index on active weaves backs the pre-insert existence
//! check: a concurrent insert that loses the race is reported as a duplicate.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use super::parse_timestamp;
use crate::domain::weave::unordered_pair;
use crate::domain::{InsertOutcome, Weave, WeaveRepository, WeaveStatus, WeaveType};
use crate::error::{Error, Result};

/// SQLite-backed weave store
#[derive(Clone)]
pub struct SqliteWeaveRepository {
    pool: SqlitePool,
}

impl SqliteWeaveRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WeaveRepository for SqliteWeaveRepository {
    async fn find_active(
        &self,
        plexus_id: &str,
        repo_a: &str,
        repo_b: &str,
        weave_type: WeaveType,
    ) -> Result<Option<Weave>> {
        let (low, high) = unordered_pair(repo_a, repo_b);

        let row: Option<WeaveRow> = sqlx::query_as(
            r#"
            SELECT * FROM weaves
            WHERE plexus_id = ? AND pair_low = ? AND pair_high = ?
              AND weave_type = ? AND status = 'active'
            LIMIT 1
            "#,
        )
        .bind(plexus_id)
        .bind(&low)
        .bind(&high)
        .bind(weave_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WeaveRow::into_weave).transpose()
    }

    async fn insert(&self, weave: &Weave) -> Result<InsertOutcome> {
        let (low, high) = weave.pair_key();
        let metadata_json = serde_json::to_string(&weave.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO weaves (
                id, plexus_id, source_repo_id, target_repo_id, pair_low, pair_high,
                weave_type, title, description, score, metadata_json, status, run_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&weave.id)
        .bind(&weave.plexus_id)
        .bind(&weave.source_repo_id)
        .bind(&weave.target_repo_id)
        .bind(&low)
        .bind(&high)
        .bind(weave.weave_type.as_str())
        .bind(&weave.title)
        .bind(&weave.description)
        .bind(weave.score)
        .bind(&metadata_json)
        .bind(weave.status.as_str())
        .bind(&weave.run_id)
        .bind(weave.created_at.to_rfc3339())
        .bind(weave.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(
                    weave_id = %weave.id,
                    weave_type = %weave.weave_type,
                    source = %weave.source_repo_id,
                    target = %weave.target_repo_id,
                    "Weave inserted"
                );
                Ok(InsertOutcome::Inserted)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(
                    weave_type = %weave.weave_type,
                    source = %weave.source_repo_id,
                    target = %weave.target_repo_id,
                    "Active weave already exists"
                );
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(Error::DatabaseError(e)),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Weave>> {
        let row: Option<WeaveRow> = sqlx::query_as("SELECT * FROM weaves WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(WeaveRow::into_weave).transpose()
    }

    async fn list(
        &self,
        plexus_id: &str,
        weave_type: Option<WeaveType>,
        include_dismissed: bool,
    ) -> Result<Vec<Weave>> {
        let mut sql = String::from("SELECT * FROM weaves WHERE plexus_id = ?");
        if weave_type.is_some() {
            sql.push_str(" AND weave_type = ?");
        }
        if !include_dismissed {
            sql.push_str(" AND status = 'active'");
        }
        sql.push_str(" ORDER BY score DESC, created_at ASC");

        let mut query = sqlx::query_as::<_, WeaveRow>(&sql).bind(plexus_id);
        if let Some(weave_type) = weave_type {
            query = query.bind(weave_type.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(WeaveRow::into_weave).collect()
    }

    async fn dismiss(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE weaves SET status = 'dismissed', updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_active(&self, plexus_id: &str) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM weaves WHERE plexus_id = ? AND status = 'active'",
        )
        .bind(plexus_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as usize)
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct WeaveRow {
    id: String,
    plexus_id: String,
    source_repo_id: String,
    target_repo_id: String,
    #[allow(dead_code)]
    pair_low: String,
    #[allow(dead_code)]
    pair_high: String,
    weave_type: String,
    title: String,
    description: String,
    score: f64,
    metadata_json: String,
    status: String,
    run_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl WeaveRow {
    fn into_weave(self) -> Result<Weave> {
        let weave_type = WeaveType::parse(&self.weave_type)
            .ok_or_else(|| Error::Other(format!("Invalid weave type: {}", self.weave_type)))?;
        let status = WeaveStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid weave status: {}", self.status)))?;
        let metadata = serde_json::from_str(&self.metadata_json)?;

        Ok(Weave {
            created_at: parse_timestamp("weaves.created_at", &self.created_at)?,
            updated_at: parse_timestamp("weaves.updated_at", &self.updated_at)?,
            id: self.id,
            plexus_id: self.plexus_id,
            source_repo_id: self.source_repo_id,
            target_repo_id: self.target_repo_id,
            weave_type,
            title: self.title,
            description: self.description,
            score: self.score,
            metadata,
            status,
            run_id: self.run_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Plexus, ScopeCatalog};
    use crate::infrastructure::SqliteScopeCatalog;
    use crate::storage::Database;
    use serde_json::json;

    async fn setup() -> (SqliteWeaveRepository, String) {
        let db = Database::in_memory().await.expect("Failed to create test database");
        let plexus = Plexus::new("tools");
        SqliteScopeCatalog::new(db.pool().clone())
            .create_plexus(&plexus)
            .await
            .unwrap();
        (SqliteWeaveRepository::new(db.pool().clone()), plexus.id)
    }

    fn weave(plexus_id: &str, source: &str, target: &str, weave_type: WeaveType, score: f64) -> Weave {
        Weave::new(plexus_id, source, target, weave_type, "title", "description")
            .with_score(score)
            .with_metadata(json!({ "rule_id": "pipeline" }))
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (repo, plexus_id) = setup().await;
        let w = weave(&plexus_id, "a", "b", WeaveType::FeedsInto, 0.8);

        assert_eq!(repo.insert(&w).await.unwrap(), InsertOutcome::Inserted);

        let stored = repo.get(&w.id).await.unwrap().unwrap();
        assert_eq!(stored.weave_type, WeaveType::FeedsInto);
        assert_eq!(stored.metadata["rule_id"], "pipeline");
        assert_eq!(stored.status, WeaveStatus::Active);
        assert!(stored.run_id.is_none());
    }

    #[tokio::test]
    async fn test_find_active_is_order_insensitive() {
        let (repo, plexus_id) = setup().await;
        repo.insert(&weave(&plexus_id, "b", "a", WeaveType::FeedsInto, 0.8))
            .await
            .unwrap();

        assert!(repo.find_active(&plexus_id, "a", "b", WeaveType::FeedsInto).await.unwrap().is_some());
        assert!(repo.find_active(&plexus_id, "b", "a", WeaveType::FeedsInto).await.unwrap().is_some());
        assert!(repo.find_active(&plexus_id, "a", "b", WeaveType::Documents).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reverse_direction_insert_is_duplicate() {
        let (repo, plexus_id) = setup().await;
        repo.insert(&weave(&plexus_id, "a", "b", WeaveType::FeedsInto, 0.8))
            .await
            .unwrap();

        let outcome = repo
            .insert(&weave(&plexus_id, "b", "a", WeaveType::FeedsInto, 0.9))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Duplicate);
        assert_eq!(repo.count_active(&plexus_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dismissed_weave_frees_the_pair() {
        let (repo, plexus_id) = setup().await;
        let first = weave(&plexus_id, "a", "b", WeaveType::FeedsInto, 0.8);
        repo.insert(&first).await.unwrap();

        assert!(repo.dismiss(&first.id).await.unwrap());
        assert!(!repo.dismiss("missing").await.unwrap());
        assert!(repo.find_active(&plexus_id, "a", "b", WeaveType::FeedsInto).await.unwrap().is_none());

        let second = weave(&plexus_id, "a", "b", WeaveType::FeedsInto, 0.7);
        assert_eq!(repo.insert(&second).await.unwrap(), InsertOutcome::Inserted);

        assert_eq!(repo.list(&plexus_id, None, false).await.unwrap().len(), 1);
        assert_eq!(repo.list(&plexus_id, None, true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let (repo, plexus_id) = setup().await;
        repo.insert(&weave(&plexus_id, "a", "b", WeaveType::FeedsInto, 0.6)).await.unwrap();
        repo.insert(&weave(&plexus_id, "a", "c", WeaveType::FeedsInto, 0.9)).await.unwrap();
        repo.insert(&weave(&plexus_id, "b", "c", WeaveType::Documents, 0.7)).await.unwrap();

        let all = repo.list(&plexus_id, None, false).await.unwrap();
        let scores: Vec<f64> = all.iter().map(|w| w.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.6]);

        let feeds = repo.list(&plexus_id, Some(WeaveType::FeedsInto), false).await.unwrap();
        assert_eq!(feeds.len(), 2);
        assert!(feeds.iter().all(|w| w.weave_type == WeaveType::FeedsInto));
    }
}
