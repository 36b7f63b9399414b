//! Infrastructure layer
//!
//! SQLite implementations of the domain repository traits, the profile cache
//! and the fragment index.

pub mod fragments;
pub mod profile_cache;
pub mod run;
pub mod scope;
pub mod weave;

pub use fragments::SqliteFragmentIndex;
pub use profile_cache::SqliteProfileCache;
pub use run::SqliteDiscoveryRunRepository;
pub use scope::SqliteScopeCatalog;
pub use weave::SqliteWeaveRepository;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Parse an RFC 3339 column value
pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("Invalid timestamp in {}: {}", column, e)))
}

/// Parse an optional RFC 3339 column value
pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(column, v)).transpose()
}
