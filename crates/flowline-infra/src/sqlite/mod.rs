//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod chain;
pub mod execution;
pub mod pool;

pub use chain::SqliteChainRunRepository;
pub use execution::SqliteExecutionRecorder;
pub use pool::DatabasePool;

use chrono::{DateTime, Utc};
use flowline_types::error::RepositoryError;
use flowline_types::value::StepValue;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Column helpers shared by the repositories
// ---------------------------------------------------------------------------

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Decode a JSON text column.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    column: &str,
    s: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {column} JSON: {e}")))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

pub(crate) fn value_json(value: Option<&StepValue>) -> Result<Option<String>, RepositoryError> {
    value.map(to_json).transpose()
}

pub(crate) fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}
