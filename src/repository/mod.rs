//! Persistent task store built on diesel-async over SQLite.

mod pool;
mod task;

pub use pool::{DieselError, SqliteConn, SqlitePool};
pub use task::TaskRepository;

use chrono::{DateTime, Utc};

/// Parse an optional stored RFC 3339 timestamp, tolerating legacy rows
/// written by other tools.
pub(crate) fn parse_datetime_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
