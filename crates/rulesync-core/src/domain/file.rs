//! File descriptors produced by storage adapters
//!
//! A [`FileInfo`] is a point-in-time observation of one filesystem
//! entry. Descriptors are transient: they are produced by listing,
//! consumed by the planner, and discarded after plan execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// A regular file with content
    Regular,
    /// A directory
    Directory,
    /// A symbolic link (listed but never followed by the engine)
    Symlink,
}

/// Metadata for one filesystem entry, relative to an endpoint root
///
/// Paths always use forward slashes, regardless of platform, so that
/// the same logical path addresses both sides of a sync relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Forward-slash relative path from the endpoint root
    pub path: String,

    /// Entry kind
    pub file_type: FileType,

    /// Size in bytes (0 for directories)
    pub size: u64,

    /// Last modification time, best-effort nanosecond precision
    ///
    /// Comparison uses exact instant equality. Callers that need
    /// tolerant comparison (e.g. FAT32's 2s resolution) must truncate
    /// before handing descriptors to the engine.
    pub mtime: DateTime<Utc>,

    /// Content hash, empty when not computed
    ///
    /// Adapters leave this empty for directories and for files above
    /// their checksum size ceiling. The algorithm is consistent within
    /// one sync session.
    #[serde(default)]
    pub checksum: String,

    /// Back-end version tag, when the transport provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl FileInfo {
    /// Returns true if this entry is a regular file
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::Regular
    }

    /// Returns true if this entry is a directory
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Number of path separators; the planner orders actions by depth
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(path: &str, file_type: FileType) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            file_type,
            size: 0,
            mtime: Utc::now(),
            checksum: String::new(),
            etag: None,
        }
    }

    #[test]
    fn test_type_predicates() {
        assert!(info("a.txt", FileType::Regular).is_file());
        assert!(!info("a.txt", FileType::Regular).is_dir());
        assert!(info("docs", FileType::Directory).is_dir());
        assert!(!info("link", FileType::Symlink).is_file());
    }

    #[test]
    fn test_depth_counts_separators() {
        assert_eq!(info("a.txt", FileType::Regular).depth(), 0);
        assert_eq!(info("docs/a.txt", FileType::Regular).depth(), 1);
        assert_eq!(info("a/b/c/d.txt", FileType::Regular).depth(), 3);
    }
}
