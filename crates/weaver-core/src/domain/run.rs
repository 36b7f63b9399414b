//! Discovery runs
//!
//! A run is one batch pass of discovery over a plexus. It moves from
//! `Running` to exactly one terminal status, carries progress counters that an
//! observer can poll mid-flight, the options it was started with, and an
//! append-only structured log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

use super::weave::WeaveType;

/// A single discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRun {
    pub id: String,
    pub plexus_id: String,
    pub mode: DiscoveryMode,
    pub status: RunStatus,
    pub counters: RunCounters,
    /// Options the run was started with
    pub config: Value,
    pub log: Vec<RunLogEntry>,
    /// Captured failure message for failed runs
    pub error: Option<String>,
    /// Pipeline stage in progress; not persisted
    #[serde(skip)]
    pub current_stage: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DiscoveryRun {
    /// Start a new run
    pub fn new(plexus_id: impl Into<String>, mode: DiscoveryMode, config: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            plexus_id: plexus_id.into(),
            mode,
            status: RunStatus::Running,
            counters: RunCounters::default(),
            config,
            log: Vec::new(),
            error: None,
            current_stage: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Finalize as completed (no-op if already terminal)
    pub fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Finalize as failed with a captured message (no-op if already terminal)
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Wall-clock duration, once finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which discovery pipeline a run executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Profile, match, assess
    Profile,
    /// Fragment similarity grouped by file pair
    Embedding,
}

impl DiscoveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Embedding => "embedding",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "profile" => Some(Self::Profile),
            "embedding" => Some(Self::Embedding),
            _ => None,
        }
    }
}

/// Progress counters, updated incrementally during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCounters {
    pub profiles: usize,
    pub philosophical_profiles: usize,
    pub pairs_checked: usize,
    pub candidates_found: usize,
    pub candidates_assessed: usize,
    pub matches_found: usize,
    pub weaves_saved: usize,
    pub weaves_skipped: usize,
    pub oracle_failures: usize,
}

/// Severity of a run log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One structured entry in a run's append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Pipeline stage, e.g. `profiling`
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RunLogEntry {
    pub fn new(level: LogLevel, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            stage: stage.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn info(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, stage, message)
    }

    pub fn warn(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, stage, message)
    }

    pub fn error(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, stage, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Events emitted while a run progresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    RunStarted {
        run_id: String,
        plexus_id: String,
        mode: DiscoveryMode,
        timestamp: DateTime<Utc>,
    },
    StageStarted {
        run_id: String,
        stage: String,
        timestamp: DateTime<Utc>,
    },
    WeaveSaved {
        run_id: String,
        weave_id: String,
        weave_type: WeaveType,
        source_repo_id: String,
        target_repo_id: String,
        score: f64,
        timestamp: DateTime<Utc>,
    },
    WeaveSkipped {
        run_id: String,
        weave_type: WeaveType,
        source_repo_id: String,
        target_repo_id: String,
        timestamp: DateTime<Utc>,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
        counters: RunCounters,
        timestamp: DateTime<Utc>,
    },
}

impl DiscoveryEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunStarted { timestamp, .. }
            | Self::StageStarted { timestamp, .. }
            | Self::WeaveSaved { timestamp, .. }
            | Self::WeaveSkipped { timestamp, .. }
            | Self::RunFinished { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StageStarted { .. } => "stage_started",
            Self::WeaveSaved { .. } => "weave_saved",
            Self::WeaveSkipped { .. } => "weave_skipped",
            Self::RunFinished { .. } => "run_finished",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::WeaveSaved { run_id, .. }
            | Self::WeaveSkipped { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }
}

/// Repository trait for discovery run bookkeeping
#[async_trait]
pub trait DiscoveryRunRepository: Send + Sync {
    /// Create the run record
    async fn create(&self, run: &DiscoveryRun) -> Result<()>;

    /// Overwrite the progress counters of a running run
    async fn update_counters(&self, run_id: &str, counters: &RunCounters) -> Result<()>;

    /// Append one entry to the run log
    async fn append_log(&self, run_id: &str, entry: &RunLogEntry) -> Result<()>;

    /// Persist the terminal state; returns false if the run was already final
    async fn finalize(&self, run: &DiscoveryRun) -> Result<bool>;

    /// Get a run by ID
    async fn get(&self, id: &str) -> Result<Option<DiscoveryRun>>;

    /// List runs of a plexus, newest first
    async fn list(&self, plexus_id: &str, limit: usize) -> Result<Vec<DiscoveryRun>>;
}
