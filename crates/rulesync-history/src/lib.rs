//! rulesync history - execution history persistence
//!
//! SQLite-backed implementation of the `IHistoryStore` port. Writes
//! are serialized through a single-connection pool, so concurrent sync
//! runs append without tripping over SQLite's writer lock, and readers
//! always observe a consistent snapshot thanks to WAL journaling.

pub mod pool;
pub mod store;

pub use pool::HistoryPool;
pub use store::SqliteHistoryStore;

/// Errors raised by the history store
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded into a record
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("limit must be positive")]
    InvalidLimit,
}

impl From<sqlx::Error> for HistoryError {
    fn from(e: sqlx::Error) -> Self {
        HistoryError::QueryFailed(e.to_string())
    }
}
