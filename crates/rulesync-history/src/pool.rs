//! Database connection pool
//!
//! A thin wrapper around SQLx's `SqlitePool` configured for the
//! history workload: WAL journaling for concurrent readers, a busy
//! timeout to ride out write contention, and a single connection so
//! the engine serializes its own writes instead of surfacing
//! "database is locked" errors to callers.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::HistoryError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_name TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    status TEXT NOT NULL,
    files_synced INTEGER NOT NULL DEFAULT 0,
    bytes_synced INTEGER NOT NULL DEFAULT 0,
    error TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_executions_rule_time
    ON executions(rule_name, start_time DESC);
CREATE INDEX IF NOT EXISTS idx_executions_status
    ON executions(status);
"#;

/// Connection pool for the history database
pub struct HistoryPool {
    pool: SqlitePool,
}

impl HistoryPool {
    /// Opens (creating if needed) the history database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HistoryError::ConnectionFailed(format!(
                    "creating database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // Single writer: appends from concurrent runs queue here
            // rather than failing on SQLite's database lock.
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                HistoryError::ConnectionFailed(format!(
                    "connecting to {}: {e}",
                    db_path.display()
                ))
            })?;

        Self::migrate(&pool).await?;

        tracing::info!(path = %db_path.display(), "history database ready");
        Ok(Self { pool })
    }

    /// Opens an in-memory database (tests)
    pub async fn in_memory() -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Memory);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::ConnectionFailed(e.to_string()))?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), HistoryError> {
        sqlx::raw_sql(SCHEMA)
            .execute(pool)
            .await
            .map_err(|e| HistoryError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// The underlying SQLx pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes all connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
