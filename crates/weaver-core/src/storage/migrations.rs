//! Database migrations
//!
//! This module manages SQLite schema migrations for weaver.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Plexuses, discovery runs and weaves
const MIGRATION_V1: &str = r#"
    -- Plexuses (discovery scopes)
    CREATE TABLE IF NOT EXISTS plexuses (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at TEXT NOT NULL
    );

    -- Repository membership of a plexus
    CREATE TABLE IF NOT EXISTS plexus_repositories (
        plexus_id TEXT NOT NULL REFERENCES plexuses(id) ON DELETE CASCADE,
        repo_id TEXT NOT NULL,
        name TEXT NOT NULL,
        local_path TEXT,
        added_at TEXT NOT NULL,
        PRIMARY KEY (plexus_id, repo_id)
    );

    CREATE INDEX IF NOT EXISTS idx_plexus_repositories_repo ON plexus_repositories(repo_id);

    -- Discovery runs with counters, captured options and append-only log
    CREATE TABLE IF NOT EXISTS discovery_runs (
        id TEXT PRIMARY KEY NOT NULL,
        plexus_id TEXT NOT NULL REFERENCES plexuses(id) ON DELETE CASCADE,
        mode TEXT NOT NULL CHECK (mode IN ('profile', 'embedding')),
        status TEXT NOT NULL DEFAULT 'running' CHECK (status IN ('running', 'completed', 'failed')),
        counters_json TEXT NOT NULL DEFAULT '{}',
        config_json TEXT NOT NULL DEFAULT '{}',
        log_json TEXT NOT NULL DEFAULT '[]',
        error TEXT,
        started_at TEXT NOT NULL,
        completed_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_discovery_runs_plexus ON discovery_runs(plexus_id);
    CREATE INDEX IF NOT EXISTS idx_discovery_runs_status ON discovery_runs(status);

    -- Weaves (persisted relationships)
    CREATE TABLE IF NOT EXISTS weaves (
        id TEXT PRIMARY KEY NOT NULL,
        plexus_id TEXT NOT NULL REFERENCES plexuses(id) ON DELETE CASCADE,
        source_repo_id TEXT NOT NULL,
        target_repo_id TEXT NOT NULL,
        pair_low TEXT NOT NULL,
        pair_high TEXT NOT NULL,
        weave_type TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        score REAL NOT NULL CHECK (score >= 0.0 AND score <= 1.0),
        metadata_json TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'dismissed')),
        run_id TEXT REFERENCES discovery_runs(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (source_repo_id != target_repo_id),
        CHECK (pair_low <= pair_high)
    );

    CREATE INDEX IF NOT EXISTS idx_weaves_plexus ON weaves(plexus_id);
    CREATE INDEX IF NOT EXISTS idx_weaves_type ON weaves(weave_type);
    CREATE INDEX IF NOT EXISTS idx_weaves_run ON weaves(run_id);

    -- At most one active weave per unordered pair per type per plexus
    CREATE UNIQUE INDEX IF NOT EXISTS idx_weaves_active_pair
        ON weaves(plexus_id, pair_low, pair_high, weave_type)
        WHERE status = 'active';
"#;

/// Migration 2: Profile cache and embedded fragments
const MIGRATION_V2: &str = r#"
    -- Cached repository profiles keyed by a hash of the profiler inputs
    CREATE TABLE IF NOT EXISTS profile_cache (
        repo_id TEXT NOT NULL,
        input_hash TEXT NOT NULL,
        profile_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (repo_id, input_hash)
    );

    -- Content fragments with precomputed embeddings (little-endian f32 blobs)
    CREATE TABLE IF NOT EXISTS fragments (
        id TEXT PRIMARY KEY NOT NULL,
        repo_id TEXT NOT NULL,
        file_path TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        embedding BLOB NOT NULL,
        dimensions INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_fragments_repo ON fragments(repo_id);
    CREATE INDEX IF NOT EXISTS idx_fragments_file ON fragments(repo_id, file_path);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Plexuses, runs and weaves");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Profile cache and fragments");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
