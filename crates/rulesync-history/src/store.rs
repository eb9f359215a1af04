//! SQLite implementation of the history port
//!
//! Timestamps are stored as RFC3339 text; status as its canonical
//! string form, rejected on decode if unknown. Rows come back newest
//! first, ordered by start time.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use rulesync_core::ports::{ExecutionRecord, ExecutionStatus, IHistoryStore};

use crate::{HistoryError, HistoryPool};

/// Execution-history store backed by SQLite
pub struct SqliteHistoryStore {
    pool: HistoryPool,
}

impl SqliteHistoryStore {
    pub fn new(pool: HistoryPool) -> Self {
        Self { pool }
    }

    fn decode_row(row: &SqliteRow) -> Result<ExecutionRecord, HistoryError> {
        let status_text: String = row.try_get("status")?;
        let status = ExecutionStatus::parse(&status_text)
            .ok_or_else(|| HistoryError::CorruptRecord(format!("unknown status: {status_text}")))?;

        let start_time: String = row.try_get("start_time")?;
        let end_time: String = row.try_get("end_time")?;
        let files_synced: i64 = row.try_get("files_synced")?;
        let bytes_synced: i64 = row.try_get("bytes_synced")?;

        Ok(ExecutionRecord {
            id: row.try_get("id")?,
            rule_name: row.try_get("rule_name")?,
            start_time: parse_timestamp(&start_time)?,
            end_time: parse_timestamp(&end_time)?,
            status,
            files_synced: files_synced.max(0) as u64,
            bytes_synced: bytes_synced.max(0) as u64,
            error: row.try_get("error")?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HistoryError::CorruptRecord(format!("bad timestamp '{s}': {e}")))
}

const SELECT_COLUMNS: &str =
    "id, rule_name, start_time, end_time, status, files_synced, bytes_synced, error";

#[async_trait::async_trait]
impl IHistoryStore for SqliteHistoryStore {
    async fn save(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO executions \
             (rule_name, start_time, end_time, status, files_synced, bytes_synced, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.rule_name)
        .bind(record.start_time.to_rfc3339())
        .bind(record.end_time.to_rfc3339())
        .bind(record.status.as_str())
        .bind(record.files_synced as i64)
        .bind(record.bytes_synced as i64)
        .bind(&record.error)
        .execute(self.pool.pool())
        .await
        .map_err(HistoryError::from)?;

        tracing::debug!(
            rule = %record.rule_name,
            status = %record.status,
            "execution record saved"
        );
        Ok(())
    }

    async fn history(&self, rule_name: &str, limit: u32) -> anyhow::Result<Vec<ExecutionRecord>> {
        if limit == 0 {
            return Err(HistoryError::InvalidLimit.into());
        }

        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM executions \
             WHERE rule_name = ? ORDER BY start_time DESC LIMIT ?"
        ))
        .bind(rule_name)
        .bind(limit as i64)
        .fetch_all(self.pool.pool())
        .await
        .map_err(HistoryError::from)?;

        rows.iter()
            .map(|row| SqliteHistoryStore::decode_row(row).map_err(Into::into))
            .collect()
    }

    async fn last_success(&self, rule_name: &str) -> anyhow::Result<Option<ExecutionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM executions \
             WHERE rule_name = ? AND status = 'success' \
             ORDER BY start_time DESC LIMIT 1"
        ))
        .bind(rule_name)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(HistoryError::from)?;

        row.map(|row| SqliteHistoryStore::decode_row(&row).map_err(Into::into))
            .transpose()
    }

    async fn all_history(&self, limit: u32) -> anyhow::Result<Vec<ExecutionRecord>> {
        if limit == 0 {
            return Err(HistoryError::InvalidLimit.into());
        }

        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM executions \
             ORDER BY start_time DESC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(self.pool.pool())
        .await
        .map_err(HistoryError::from)?;

        rows.iter()
            .map(|row| SqliteHistoryStore::decode_row(row).map_err(Into::into))
            .collect()
    }
}
