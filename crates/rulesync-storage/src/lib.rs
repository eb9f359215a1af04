//! rulesync storage - adapter implementations
//!
//! Concrete implementations of the storage port:
//!
//! - [`LocalAdapter`] - local filesystem over `tokio::fs`, with atomic
//!   temp+rename writes and checksums computed during listing
//! - [`MemoryAdapter`] - in-memory tree for tests and embedding
//!
//! Both adapters confine every operation to their root: relative paths
//! are cleaned and any component that would escape (`..`, absolute
//! paths, drive prefixes) is rejected before touching the back-end.

pub mod checksum;
pub mod local;
pub mod memory;

pub use checksum::{ChecksumAlgorithm, ChecksumOptions};
pub use local::{LocalAdapter, LocalAdapterFactory};
pub use memory::{MemoryAdapter, MemoryAdapterFactory};

use rulesync_core::domain::StorageError;

/// Cleans a relative forward-slash path, rejecting root escapes
///
/// Returns the normalized path (no leading/trailing slash, no empty or
/// `.` components). The empty string addresses the adapter root.
pub(crate) fn clean_rel_path(path: &str) -> Result<String, StorageError> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(StorageError::PermissionDenied(path.to_string()));
    }
    // Reject Windows drive switches like `C:`.
    if path.len() >= 2 && path.as_bytes()[1] == b':' {
        return Err(StorageError::PermissionDenied(path.to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => return Err(StorageError::PermissionDenied(path.to_string())),
            c => parts.push(c),
        }
    }
    Ok(parts.join("/"))
}

/// Joins a cleaned relative path onto a parent, keeping forward slashes
pub(crate) fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_rel_path_normalizes() {
        assert_eq!(clean_rel_path("a/b/c.txt").unwrap(), "a/b/c.txt");
        assert_eq!(clean_rel_path("./a//b/").unwrap(), "a/b");
        assert_eq!(clean_rel_path("").unwrap(), "");
        assert_eq!(clean_rel_path(".").unwrap(), "");
    }

    #[test]
    fn test_clean_rel_path_rejects_escapes() {
        assert!(clean_rel_path("../etc/passwd").is_err());
        assert!(clean_rel_path("a/../../b").is_err());
        assert!(clean_rel_path("/etc/passwd").is_err());
        assert!(clean_rel_path("C:/windows").is_err());
        assert!(clean_rel_path("\\server\\share").is_err());
    }

    #[test]
    fn test_join_rel() {
        assert_eq!(join_rel("", "a.txt"), "a.txt");
        assert_eq!(join_rel("docs", "a.txt"), "docs/a.txt");
    }
}
