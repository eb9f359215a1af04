//! Domain entities and errors
//!
//! The types in this module are transport-agnostic: a [`FileInfo`] looks
//! the same whether it came from the local filesystem or an object
//! store, and a [`SyncPlan`] can be executed against any pair of
//! adapters that honor the storage port contract.

pub mod action;
pub mod errors;
pub mod file;
pub mod rule;

pub use action::{ActionKind, PlanStats, SyncAction, SyncDirection, SyncPlan};
pub use errors::{ConfigError, StorageError, SyncError};
pub use file::{FileInfo, FileType};
pub use rule::{ConflictStrategy, Endpoint, SyncMode, SyncRule, Transport, TransportKind};
