//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the traits the engine core depends on; their
//! implementations live in adapter crates.
//!
//! - [`IStorageAdapter`] - tree I/O for one endpoint
//! - [`IAdapterFactory`] - adapter construction per transport
//! - [`IHistoryStore`] - persistent execution history

pub mod history;
pub mod storage;

pub use history::{ExecutionRecord, ExecutionStatus, IHistoryStore};
pub use storage::{ByteStream, IAdapterFactory, IStorageAdapter};
