//! Error taxonomies shared across the engine
//!
//! Three closed sets, one per layer. Adapters normalize back-end
//! failures into [`StorageError`]; the planner never fails with I/O
//! errors at all; the executor and service surface [`SyncError`];
//! configuration loading surfaces [`ConfigError`]. Lock errors live
//! with the lock itself in `rulesync-sync`.

use thiserror::Error;

use super::action::ActionKind;

/// Normalized storage back-end failures
///
/// Every adapter maps its native errors into this set so callers can
/// react uniformly regardless of transport.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotDirectory(String),

    #[error("not a file: {0}")]
    NotFile(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("network error: {0}")]
    Network(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    /// OS-level failure that fits none of the taxonomy kinds
    #[error("i/o error: {0}")]
    Io(String),
}

impl StorageError {
    /// Normalizes a `std::io::Error` for the given path
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
            ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
            ErrorKind::TimedOut => StorageError::Timeout(path.to_string()),
            _ => StorageError::Io(format!("{path}: {err}")),
        }
    }

    /// True for [`StorageError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Failures of planning and execution
#[derive(Debug, Error)]
pub enum SyncError {
    /// An unresolved conflict blocked the operation
    #[error("sync conflict at {path}")]
    Conflict { path: String },

    #[error("invalid sync rule: {0}")]
    InvalidRule(String),

    /// A rule syncs an endpoint with itself
    #[error("rule '{0}' has identical source and target endpoints")]
    CircularDependency(String),

    /// Another sync run holds the lock
    #[error("sync already in progress: {holder}")]
    InProgress { holder: String },

    /// The ambient context was cancelled mid-run
    #[error("sync cancelled")]
    Cancelled,

    /// An action failed during execution; the run aborted here
    #[error("action {kind} on {path}: {source}")]
    ActionFailed {
        kind: ActionKind,
        path: String,
        #[source]
        source: StorageError,
    },

    /// An adapter failed outside any single action (e.g. listing)
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found")]
    NotFound,

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("transport not found: {0}")]
    TransportNotFound(String),
}
