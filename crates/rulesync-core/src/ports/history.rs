//! Execution history port (driven/secondary port)
//!
//! An append-only log of sync run outcomes, keyed by rule. Writes may
//! arrive from concurrent runs; implementations serialize them
//! internally and readers observe a consistent snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    /// Some actions completed before the run was aborted or cancelled
    Partial,
}

impl ExecutionStatus {
    /// Canonical persisted form
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Partial => "partial",
        }
    }

    /// Parses the persisted form, rejecting anything outside the set
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ExecutionStatus::Success),
            "failed" => Some(ExecutionStatus::Failed),
            "partial" => Some(ExecutionStatus::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted sync run outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Store-assigned identifier; 0 before the record is saved
    #[serde(default)]
    pub id: i64,

    pub rule_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ExecutionStatus,

    /// Files actually copied during the run
    pub files_synced: u64,

    /// Bytes actually transferred during the run
    pub bytes_synced: u64,

    /// Error description for failed and partial runs, empty otherwise
    #[serde(default)]
    pub error: String,
}

/// Port trait for execution-history persistence
#[async_trait::async_trait]
pub trait IHistoryStore: Send + Sync {
    /// Appends one record
    async fn save(&self, record: &ExecutionRecord) -> anyhow::Result<()>;

    /// Returns up to `limit` records for a rule, newest first
    ///
    /// `limit` must be positive.
    async fn history(&self, rule_name: &str, limit: u32) -> anyhow::Result<Vec<ExecutionRecord>>;

    /// Returns the most recent successful record for a rule, if any
    async fn last_success(&self, rule_name: &str) -> anyhow::Result<Option<ExecutionRecord>>;

    /// Returns up to `limit` records across all rules, newest first
    async fn all_history(&self, limit: u32) -> anyhow::Result<Vec<ExecutionRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
            ExecutionStatus::Partial,
        ] {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert_eq!(ExecutionStatus::parse("running"), None);
        assert_eq!(ExecutionStatus::parse(""), None);
        assert_eq!(ExecutionStatus::parse("SUCCESS"), None);
    }
}
