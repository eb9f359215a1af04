//! Local filesystem adapter
//!
//! Serves one directory tree rooted at an absolute path. Writes go
//! through a sibling temp file and an atomic rename so a cancelled or
//! failed copy never leaves a partially written file visible.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use rulesync_core::domain::{FileInfo, FileType, StorageError, Transport, TransportKind};
use rulesync_core::ports::{ByteStream, IAdapterFactory, IStorageAdapter};

use crate::checksum::{self, ChecksumAlgorithm, ChecksumOptions};
use crate::{clean_rel_path, join_rel};

/// Storage adapter over the local filesystem
pub struct LocalAdapter {
    root: PathBuf,
    algorithm: ChecksumAlgorithm,
    checksum_options: ChecksumOptions,
}

impl LocalAdapter {
    /// Creates an adapter rooted at an existing directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::with_checksums(root, ChecksumAlgorithm::default(), ChecksumOptions::default())
    }

    /// Creates an adapter with explicit checksum configuration
    pub fn with_checksums(
        root: impl Into<PathBuf>,
        algorithm: ChecksumAlgorithm,
        checksum_options: ChecksumOptions,
    ) -> Result<Self, StorageError> {
        let root: PathBuf = root.into();
        let meta = std::fs::metadata(&root)
            .map_err(|e| StorageError::from_io(&root.to_string_lossy(), e))?;
        if !meta.is_dir() {
            return Err(StorageError::NotDirectory(
                root.to_string_lossy().into_owned(),
            ));
        }
        Ok(Self {
            root,
            algorithm,
            checksum_options,
        })
    }

    /// Resolves a relative path to an absolute path inside the root
    fn resolve(&self, path: &str) -> Result<(String, PathBuf), StorageError> {
        let cleaned = clean_rel_path(path)?;
        let mut full = self.root.clone();
        for component in cleaned.split('/').filter(|c| !c.is_empty()) {
            full.push(component);
        }
        Ok((cleaned, full))
    }

    fn file_info(
        &self,
        rel_path: &str,
        meta: &std::fs::Metadata,
        is_symlink: bool,
    ) -> FileInfo {
        let file_type = if is_symlink {
            FileType::Symlink
        } else if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::Regular
        };
        let mtime: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        FileInfo {
            path: rel_path.to_string(),
            file_type,
            size: if file_type == FileType::Directory {
                0
            } else {
                meta.len()
            },
            mtime,
            checksum: String::new(),
            etag: None,
        }
    }

    async fn checksum_for(&self, full: &Path, size: u64) -> String {
        if self.checksum_options.max_size > 0 && size > self.checksum_options.max_size {
            return String::new();
        }
        let file = match fs::File::open(full).await {
            Ok(f) => f,
            Err(_) => return String::new(),
        };
        match checksum::compute(file, self.algorithm, self.checksum_options).await {
            Ok(Some(digest)) => digest,
            // Unreadable or over-ceiling files fall back to the
            // size-based comparison path.
            _ => String::new(),
        }
    }
}

#[async_trait::async_trait]
impl IStorageAdapter for LocalAdapter {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list(&self, path: &str) -> Result<Vec<FileInfo>, StorageError> {
        let (rel, full) = self.resolve(path)?;

        let meta = fs::metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(&rel, e))?;
        if !meta.is_dir() {
            return Err(StorageError::NotDirectory(rel));
        }

        let mut entries = fs::read_dir(&full)
            .await
            .map_err(|e| StorageError::from_io(&rel, e))?;

        let mut result = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(&rel, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let entry_rel = join_rel(&rel, &name);

            let symlink_meta = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    // Entries that vanish mid-listing are skipped.
                    warn!(path = %entry_rel, error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let is_symlink = entry
                .file_type()
                .await
                .map(|t| t.is_symlink())
                .unwrap_or(false);

            let mut info = self.file_info(&entry_rel, &symlink_meta, is_symlink);
            if info.is_file() {
                info.checksum = self.checksum_for(&entry.path(), info.size).await;
            }
            result.push(info);
        }

        debug!(count = result.len(), "listed directory");
        Ok(result)
    }

    async fn read(&self, path: &str) -> Result<ByteStream, StorageError> {
        let (rel, full) = self.resolve(path)?;
        let meta = fs::metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(&rel, e))?;
        if meta.is_dir() {
            return Err(StorageError::NotFile(rel));
        }
        let file = fs::File::open(&full)
            .await
            .map_err(|e| StorageError::from_io(&rel, e))?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self, data))]
    async fn write(&self, path: &str, mut data: ByteStream) -> Result<(), StorageError> {
        let (rel, full) = self.resolve(path)?;
        if rel.is_empty() {
            return Err(StorageError::NotFile(path.to_string()));
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(&rel, e))?;
        }

        // Temp file in the same directory so the rename stays on one
        // filesystem and is atomic.
        let tmp_path = {
            let mut p = full.as_os_str().to_owned();
            p.push(".rulesync-tmp");
            PathBuf::from(p)
        };

        let result = async {
            let mut tmp = fs::File::create(&tmp_path)
                .await
                .map_err(|e| StorageError::from_io(&rel, e))?;
            tokio::io::copy(&mut data, &mut tmp)
                .await
                .map_err(|e| StorageError::from_io(&rel, e))?;
            tmp.flush()
                .await
                .map_err(|e| StorageError::from_io(&rel, e))?;
            drop(tmp);
            fs::rename(&tmp_path, &full)
                .await
                .map_err(|e| StorageError::from_io(&rel, e))
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let (rel, full) = self.resolve(path)?;
        let meta = fs::metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(&rel, e))?;
        if meta.is_dir() {
            fs::remove_dir(&full)
                .await
                .map_err(|e| StorageError::from_io(&rel, e))
        } else {
            fs::remove_file(&full)
                .await
                .map_err(|e| StorageError::from_io(&rel, e))
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        let (rel, full) = self.resolve(path)?;
        fs::create_dir_all(&full)
            .await
            .map_err(|e| StorageError::from_io(&rel, e))
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError> {
        let (rel, full) = self.resolve(path)?;
        let symlink_meta = fs::symlink_metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(&rel, e))?;
        let is_symlink = symlink_meta.file_type().is_symlink();
        Ok(self.file_info(&rel, &symlink_meta, is_symlink))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let (rel, full) = self.resolve(path)?;
        fs::try_exists(&full)
            .await
            .map_err(|e| StorageError::from_io(&rel, e))
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Factory building [`LocalAdapter`]s for local transports
pub struct LocalAdapterFactory {
    algorithm: ChecksumAlgorithm,
    checksum_options: ChecksumOptions,
}

impl LocalAdapterFactory {
    pub fn new(algorithm: ChecksumAlgorithm, checksum_options: ChecksumOptions) -> Self {
        Self {
            algorithm,
            checksum_options,
        }
    }
}

impl Default for LocalAdapterFactory {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::default(), ChecksumOptions::default())
    }
}

impl IAdapterFactory for LocalAdapterFactory {
    fn create(
        &self,
        _transport: &Transport,
        root: &str,
    ) -> Result<Arc<dyn IStorageAdapter>, StorageError> {
        let adapter = LocalAdapter::with_checksums(root, self.algorithm, self.checksum_options)?;
        Ok(Arc::new(adapter))
    }

    fn supports(&self, transport: &Transport) -> bool {
        transport.kind == TransportKind::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn stream(data: &[u8]) -> ByteStream {
        Box::new(std::io::Cursor::new(data.to_vec()))
    }

    async fn read_all(adapter: &LocalAdapter, path: &str) -> Vec<u8> {
        let mut reader = adapter.read(path).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();

        adapter
            .write("docs/notes.txt", stream(b"hello"))
            .await
            .unwrap();
        assert_eq!(read_all(&adapter, "docs/notes.txt").await, b"hello");
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();

        adapter.write("a/b/c.txt", stream(b"one")).await.unwrap();
        adapter.write("a/b/c.txt", stream(b"two")).await.unwrap();
        assert_eq!(read_all(&adapter, "a/b/c.txt").await, b"two");

        // No temp file left behind.
        let listed = adapter.list("a/b").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "a/b/c.txt");
    }

    #[tokio::test]
    async fn test_list_computes_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();
        adapter.write("f.txt", stream(b"abc")).await.unwrap();

        let listed = adapter.list("").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(listed[0].size, 3);
    }

    #[tokio::test]
    async fn test_large_file_listed_without_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::with_checksums(
            dir.path(),
            ChecksumAlgorithm::Sha256,
            ChecksumOptions {
                max_size: 2,
                buffer_size: 1024,
            },
        )
        .unwrap();
        adapter.write("big.bin", stream(b"xxxxx")).await.unwrap();

        let listed = adapter.list("").await.unwrap();
        assert!(listed[0].checksum.is_empty());
    }

    #[tokio::test]
    async fn test_list_non_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();
        adapter.write("f.txt", stream(b"x")).await.unwrap();

        assert!(matches!(
            adapter.list("f.txt").await,
            Err(StorageError::NotDirectory(_))
        ));
        assert!(matches!(
            adapter.list("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_read_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();
        adapter.mkdir("sub").await.unwrap();
        assert!(matches!(
            adapter.read("sub").await,
            Err(StorageError::NotFile(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();

        assert!(matches!(
            adapter.read("../outside.txt").await,
            Err(StorageError::PermissionDenied(_))
        ));
        assert!(matches!(
            adapter.write("/abs.txt", stream(b"x")).await,
            Err(StorageError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_file_and_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();
        adapter.write("d/f.txt", stream(b"x")).await.unwrap();

        adapter.delete("d/f.txt").await.unwrap();
        adapter.delete("d").await.unwrap();
        assert!(!adapter.exists("d").await.unwrap());

        assert!(matches!(
            adapter.delete("d").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mkdir_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();
        adapter.mkdir("x/y/z").await.unwrap();
        adapter.mkdir("x/y/z").await.unwrap();
        let info = adapter.stat("x/y/z").await.unwrap();
        assert!(info.is_dir());
    }

    #[tokio::test]
    async fn test_new_rejects_missing_root() {
        assert!(LocalAdapter::new("/nonexistent/rulesync-root").is_err());
    }
}
