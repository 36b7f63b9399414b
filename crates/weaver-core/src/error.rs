//! Error types for Weaver

use thiserror::Error;

/// Result type alias using Weaver's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Weaver error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Plexus '{0}' not found. Run `weaver plexus list` to see all plexuses.")]
    ScopeNotFound(String),

    #[error("Discovery run '{0}' not found. Run `weaver runs list <plexus>` to see recent runs.")]
    RunNotFound(String),

    #[error("Weave '{0}' not found.")]
    WeaveNotFound(String),

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `weaver config get llm.api_key`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("No suitable model found: {0}")]
    NoSuitableModel(String),

    // Oracle errors (E200-E299)
    #[error("Oracle call '{0}' failed: {1}")]
    OracleFailure(String, String),

    #[error("Oracle call '{0}' timed out after {1} seconds")]
    OracleTimeout(String, u64),

    // Run errors (E300-E399)
    #[error("Discovery run could not be initialized: {0}")]
    RunInitialization(String),

    #[error("Discovery run cancelled")]
    Cancelled,

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ScopeNotFound(_) => "E001",
            Self::RunNotFound(_) => "E002",
            Self::WeaveNotFound(_) => "E003",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::NoSuitableModel(_) => "E103",
            Self::OracleFailure(..) => "E200",
            Self::OracleTimeout(..) => "E201",
            Self::RunInitialization(_) => "E300",
            Self::Cancelled => "E301",
            Self::DatabaseError(_) => "E400",
            Self::Serialization(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ScopeNotFound(_) => Some("weaver plexus list".to_string()),
            Self::RunNotFound(_) => Some("weaver runs list <plexus>".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("weaver config get llm.api_key".to_string()),
            Self::OracleTimeout(..) => Some("weaver config set llm.timeout_secs <secs>".to_string()),
            _ => None,
        }
    }

    /// Whether this error represents a recoverable oracle failure
    ///
    /// Oracle failures drop the unit of work they occurred in; they never
    /// fail a whole discovery run.
    pub fn is_oracle_failure(&self) -> bool {
        matches!(
            self,
            Self::OracleFailure(..)
                | Self::OracleTimeout(..)
                | Self::LLMError(_)
                | Self::RateLimited(_)
                | Self::NetworkError(_)
                | Self::NoSuitableModel(_)
        )
    }
}
