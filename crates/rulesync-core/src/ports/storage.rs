//! Storage adapter port (driven/secondary port)
//!
//! One adapter instance serves one endpoint. Paths handed to an
//! adapter are always relative, forward-slash separated, and resolved
//! against the adapter's root; implementations must reject any path
//! that would escape that root (`..` traversal, absolute paths, drive
//! prefixes).
//!
//! ## Contract notes
//!
//! - `write` must be atomic with respect to partial failure: either
//!   the complete new content becomes visible or the previous content
//!   survives (temp file + rename, or the back-end's equivalent).
//! - `mkdir` is idempotent and creates parents.
//! - Errors are normalized to the closed [`StorageError`] set.
//! - Instances are reused across plan and execute within one run and
//!   may be shared across tasks, hence the `Send + Sync` bound.

use tokio::io::AsyncRead;

use crate::domain::{FileInfo, StorageError, Transport};

/// A readable stream of file content
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Port trait for tree I/O against one endpoint
#[async_trait::async_trait]
pub trait IStorageAdapter: Send + Sync {
    /// Lists the immediate children of a directory
    ///
    /// Fails with [`StorageError::NotFound`] if the path does not
    /// exist and [`StorageError::NotDirectory`] if it is a file.
    async fn list(&self, path: &str) -> Result<Vec<FileInfo>, StorageError>;

    /// Opens a file for streaming reads
    async fn read(&self, path: &str) -> Result<ByteStream, StorageError>;

    /// Creates or atomically replaces a file from a stream
    ///
    /// Parent directories are created as needed.
    async fn write(&self, path: &str, data: ByteStream) -> Result<(), StorageError>;

    /// Removes a file or empty directory
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Creates a directory and any missing parents; idempotent
    async fn mkdir(&self, path: &str) -> Result<(), StorageError>;

    /// Returns metadata for a single path
    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError>;

    /// Checks whether a path exists
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Releases back-end resources; called once at service shutdown
    async fn close(&self) -> Result<(), StorageError>;
}

/// Factory creating adapters for a transport family
pub trait IAdapterFactory: Send + Sync {
    /// Builds an adapter rooted at `root` for the given transport
    fn create(
        &self,
        transport: &Transport,
        root: &str,
    ) -> Result<std::sync::Arc<dyn IStorageAdapter>, StorageError>;

    /// True if this factory handles the transport's kind
    fn supports(&self, transport: &Transport) -> bool;
}
