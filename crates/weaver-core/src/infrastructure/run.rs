//! SQLite implementation of the DiscoveryRunRepository

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use super::{parse_optional_timestamp, parse_timestamp};
use crate::domain::{
    DiscoveryMode, DiscoveryRun, DiscoveryRunRepository, RunCounters, RunLogEntry, RunStatus,
};
use crate::error::{Error, Result};

/// SQLite-backed run bookkeeping
#[derive(Clone)]
pub struct SqliteDiscoveryRunRepository {
    pool: SqlitePool,
}

impl SqliteDiscoveryRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiscoveryRunRepository for SqliteDiscoveryRunRepository {
    async fn create(&self, run: &DiscoveryRun) -> Result<()> {
        let counters_json = serde_json::to_string(&run.counters)?;
        let config_json = serde_json::to_string(&run.config)?;
        let log_json = serde_json::to_string(&run.log)?;

        sqlx::query(
            r#"
            INSERT INTO discovery_runs (
                id, plexus_id, mode, status, counters_json, config_json, log_json,
                error, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.plexus_id)
        .bind(run.mode.as_str())
        .bind(run.status.as_str())
        .bind(&counters_json)
        .bind(&config_json)
        .bind(&log_json)
        .bind(&run.error)
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        info!(run_id = %run.id, plexus_id = %run.plexus_id, mode = run.mode.as_str(), "Discovery run created");
        Ok(())
    }

    async fn update_counters(&self, run_id: &str, counters: &RunCounters) -> Result<()> {
        let counters_json = serde_json::to_string(counters)?;

        sqlx::query(
            "UPDATE discovery_runs SET counters_json = ? WHERE id = ? AND status = 'running'",
        )
        .bind(&counters_json)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_log(&self, run_id: &str, entry: &RunLogEntry) -> Result<()> {
        let entry_json = serde_json::to_string(entry)?;

        sqlx::query(
            "UPDATE discovery_runs SET log_json = json_insert(log_json, '$[#]', json(?)) WHERE id = ?",
        )
        .bind(&entry_json)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        debug!(run_id = %run_id, stage = %entry.stage, message = %entry.message, "Run log appended");
        Ok(())
    }

    async fn finalize(&self, run: &DiscoveryRun) -> Result<bool> {
        if !run.status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "Run {} cannot be finalized while {}",
                run.id, run.status
            )));
        }

        let counters_json = serde_json::to_string(&run.counters)?;

        let result = sqlx::query(
            r#"
            UPDATE discovery_runs
            SET status = ?, counters_json = ?, error = ?, completed_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(run.status.as_str())
        .bind(&counters_json)
        .bind(&run.error)
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(&run.id)
        .execute(&self.pool)
        .await?;

        let finalized = result.rows_affected() > 0;
        if finalized {
            info!(run_id = %run.id, status = %run.status, "Discovery run finalized");
        }
        Ok(finalized)
    }

    async fn get(&self, id: &str) -> Result<Option<DiscoveryRun>> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM discovery_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RunRow::into_run).transpose()
    }

    async fn list(&self, plexus_id: &str, limit: usize) -> Result<Vec<DiscoveryRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT * FROM discovery_runs WHERE plexus_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(plexus_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RunRow::into_run).collect()
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct RunRow {
    id: String,
    plexus_id: String,
    mode: String,
    status: String,
    counters_json: String,
    config_json: String,
    log_json: String,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn into_run(self) -> Result<DiscoveryRun> {
        let mode = DiscoveryMode::parse(&self.mode)
            .ok_or_else(|| Error::Other(format!("Invalid discovery mode: {}", self.mode)))?;
        let status = RunStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid run status: {}", self.status)))?;

        Ok(DiscoveryRun {
            started_at: parse_timestamp("discovery_runs.started_at", &self.started_at)?,
            completed_at: parse_optional_timestamp(
                "discovery_runs.completed_at",
                self.completed_at.as_deref(),
            )?,
            counters: serde_json::from_str(&self.counters_json)?,
            config: serde_json::from_str(&self.config_json)?,
            log: serde_json::from_str(&self.log_json)?,
            id: self.id,
            plexus_id: self.plexus_id,
            mode,
            status,
            error: self.error,
            current_stage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogLevel, Plexus, ScopeCatalog};
    use crate::infrastructure::SqliteScopeCatalog;
    use crate::storage::Database;
    use serde_json::json;

    async fn setup() -> (SqliteDiscoveryRunRepository, String) {
        let db = Database::in_memory().await.expect("Failed to create test database");
        let plexus = Plexus::new("tools");
        SqliteScopeCatalog::new(db.pool().clone())
            .create_plexus(&plexus)
            .await
            .unwrap();
        (SqliteDiscoveryRunRepository::new(db.pool().clone()), plexus.id)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (repo, plexus_id) = setup().await;
        let run = DiscoveryRun::new(&plexus_id, DiscoveryMode::Profile, json!({ "top_n": 20 }));
        repo.create(&run).await.unwrap();

        let stored = repo.get(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert_eq!(stored.mode, DiscoveryMode::Profile);
        assert_eq!(stored.config["top_n"], 20);
        assert!(stored.log.is_empty());
        assert!(stored.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_counters_and_log_visible_mid_run() {
        let (repo, plexus_id) = setup().await;
        let run = DiscoveryRun::new(&plexus_id, DiscoveryMode::Profile, json!({}));
        repo.create(&run).await.unwrap();

        let counters = RunCounters {
            profiles: 3,
            oracle_failures: 1,
            ..Default::default()
        };
        repo.update_counters(&run.id, &counters).await.unwrap();
        repo.append_log(&run.id, &RunLogEntry::info("profiling", "Profiled 3 repositories"))
            .await
            .unwrap();
        repo.append_log(
            &run.id,
            &RunLogEntry::warn("profiling", "Profile failed").with_data(json!({ "repo_id": "x" })),
        )
        .await
        .unwrap();

        let stored = repo.get(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.counters, counters);
        assert_eq!(stored.log.len(), 2);
        assert_eq!(stored.log[1].level, LogLevel::Warn);
        assert_eq!(stored.log[1].data.as_ref().unwrap()["repo_id"], "x");
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let (repo, plexus_id) = setup().await;
        let mut run = DiscoveryRun::new(&plexus_id, DiscoveryMode::Embedding, json!({}));
        repo.create(&run).await.unwrap();

        run.fail("cancelled");
        assert!(repo.finalize(&run).await.unwrap());

        let mut late = run.clone();
        late.status = RunStatus::Completed;
        late.error = None;
        assert!(!repo.finalize(&late).await.unwrap());

        let stored = repo.get(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("cancelled"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_finalize_requires_terminal_status() {
        let (repo, plexus_id) = setup().await;
        let run = DiscoveryRun::new(&plexus_id, DiscoveryMode::Profile, json!({}));
        repo.create(&run).await.unwrap();

        assert!(repo.finalize(&run).await.is_err());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (repo, plexus_id) = setup().await;
        let mut older = DiscoveryRun::new(&plexus_id, DiscoveryMode::Profile, json!({}));
        older.started_at -= chrono::Duration::minutes(5);
        let newer = DiscoveryRun::new(&plexus_id, DiscoveryMode::Profile, json!({}));
        repo.create(&older).await.unwrap();
        repo.create(&newer).await.unwrap();

        let runs = repo.list(&plexus_id, 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, newer.id);
        assert_eq!(repo.list(&plexus_id, 1).await.unwrap().len(), 1);
    }
}
