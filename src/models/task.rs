//! Task domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing state of a harvested link.
///
/// The integer codes are the persisted representation and must stay stable
/// across releases: existing databases carry them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be claimed, or eligible for another attempt.
    Pending,
    /// Content extracted and stored.
    Success,
    /// Retry budget exhausted; terminal.
    PermanentFailure,
}

impl TaskStatus {
    /// Persisted integer code for this status.
    pub fn code(self) -> i32 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Success => 1,
            TaskStatus::PermanentFailure => -1,
        }
    }

    /// Decode a persisted status code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Pending),
            1 => Some(TaskStatus::Success),
            -1 => Some(TaskStatus::PermanentFailure),
            _ => None,
        }
    }

    /// Whether the task can still be claimed for processing.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// One discovered post link and its processing state.
#[derive(Debug, Clone)]
pub struct Task {
    /// Post URL; the global identity of the task.
    pub link: String,
    pub status: TaskStatus,
    /// Search keyword that discovered this link.
    pub keyword: Option<String>,
    /// Extracted text, present only after a successful attempt.
    pub content: Option<String>,
    /// Failed attempts so far; never decreases.
    pub retry_count: u32,
    /// Last failure reason, first line only.
    pub error_log: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Success,
            TaskStatus::PermanentFailure,
        ] {
            assert_eq!(TaskStatus::from_code(status.code()), Some(status));
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(TaskStatus::from_code(7), None);
        assert_eq!(TaskStatus::from_code(-2), None);
    }

    #[test]
    fn only_pending_is_claimable() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::PermanentFailure.is_terminal());
    }
}
