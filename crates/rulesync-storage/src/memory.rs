//! In-memory storage adapter
//!
//! A complete implementation of the storage contract over a map,
//! used by the test suites and available as an embedding target. The
//! tree lives behind a reader/writer lock; writes replace whole
//! entries, so they are atomic by construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use rulesync_core::domain::{FileInfo, FileType, StorageError, Transport, TransportKind};
use rulesync_core::ports::{ByteStream, IAdapterFactory, IStorageAdapter};

use crate::checksum::{ChecksumAlgorithm, ChecksumOptions};
use crate::{clean_rel_path, join_rel};

#[derive(Debug, Clone)]
enum Entry {
    Dir,
    File {
        data: Vec<u8>,
        mtime: DateTime<Utc>,
        checksum: String,
    },
}

/// In-memory tree behind a reader/writer lock
#[derive(Default)]
pub struct MemoryAdapter {
    entries: RwLock<BTreeMap<String, Entry>>,
    algorithm: ChecksumAlgorithm,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file with explicit content and mtime (test fixture)
    pub async fn insert_file(&self, path: &str, data: &[u8], mtime: DateTime<Utc>) {
        let cleaned = clean_rel_path(path).expect("fixture path must be relative");
        let checksum = self.digest(data).await;
        let mut entries = self.entries.write().await;
        Self::insert_parents(&mut entries, &cleaned);
        entries.insert(
            cleaned,
            Entry::File {
                data: data.to_vec(),
                mtime,
                checksum,
            },
        );
    }

    /// Returns a file's current content (test assertion helper)
    pub async fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        let cleaned = clean_rel_path(path).ok()?;
        let entries = self.entries.read().await;
        match entries.get(&cleaned) {
            Some(Entry::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    async fn digest(&self, data: &[u8]) -> String {
        crate::checksum::compute(
            std::io::Cursor::new(data.to_vec()),
            self.algorithm,
            ChecksumOptions::default(),
        )
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
    }

    fn insert_parents(entries: &mut BTreeMap<String, Entry>, path: &str) {
        let mut parent = String::new();
        for component in path.split('/') {
            if parent.is_empty() {
                parent = component.to_string();
            } else {
                parent = format!("{parent}/{component}");
            }
            if parent == path {
                break;
            }
            entries.entry(parent.clone()).or_insert(Entry::Dir);
        }
    }

    fn info_for(path: &str, entry: &Entry) -> FileInfo {
        match entry {
            Entry::Dir => FileInfo {
                path: path.to_string(),
                file_type: FileType::Directory,
                size: 0,
                mtime: DateTime::<Utc>::UNIX_EPOCH,
                checksum: String::new(),
                etag: None,
            },
            Entry::File {
                data,
                mtime,
                checksum,
            } => FileInfo {
                path: path.to_string(),
                file_type: FileType::Regular,
                size: data.len() as u64,
                mtime: *mtime,
                checksum: checksum.clone(),
                etag: None,
            },
        }
    }
}

#[async_trait::async_trait]
impl IStorageAdapter for MemoryAdapter {
    async fn list(&self, path: &str) -> Result<Vec<FileInfo>, StorageError> {
        let cleaned = clean_rel_path(path)?;
        let entries = self.entries.read().await;

        if !cleaned.is_empty() {
            match entries.get(&cleaned) {
                Some(Entry::Dir) => {}
                Some(Entry::File { .. }) => return Err(StorageError::NotDirectory(cleaned)),
                None => return Err(StorageError::NotFound(cleaned)),
            }
        }

        let prefix = if cleaned.is_empty() {
            String::new()
        } else {
            format!("{cleaned}/")
        };

        let mut result = Vec::new();
        for (path, entry) in entries.range(prefix.clone()..) {
            if !path.starts_with(&prefix) {
                break;
            }
            let rest = &path[prefix.len()..];
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            result.push(Self::info_for(path, entry));
        }
        Ok(result)
    }

    async fn read(&self, path: &str) -> Result<ByteStream, StorageError> {
        let cleaned = clean_rel_path(path)?;
        let entries = self.entries.read().await;
        match entries.get(&cleaned) {
            Some(Entry::File { data, .. }) => Ok(Box::new(std::io::Cursor::new(data.clone()))),
            Some(Entry::Dir) => Err(StorageError::NotFile(cleaned)),
            None => Err(StorageError::NotFound(cleaned)),
        }
    }

    async fn write(&self, path: &str, mut data: ByteStream) -> Result<(), StorageError> {
        let cleaned = clean_rel_path(path)?;
        if cleaned.is_empty() {
            return Err(StorageError::NotFile(path.to_string()));
        }

        let mut buf = Vec::new();
        data.read_to_end(&mut buf)
            .await
            .map_err(|e| StorageError::from_io(&cleaned, e))?;
        let checksum = self.digest(&buf).await;

        let mut entries = self.entries.write().await;
        if matches!(entries.get(&cleaned), Some(Entry::Dir)) {
            return Err(StorageError::NotFile(cleaned));
        }
        Self::insert_parents(&mut entries, &cleaned);
        entries.insert(
            cleaned,
            Entry::File {
                data: buf,
                mtime: Utc::now(),
                checksum,
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let cleaned = clean_rel_path(path)?;
        let mut entries = self.entries.write().await;

        match entries.get(&cleaned) {
            Some(Entry::Dir) => {
                let prefix = format!("{cleaned}/");
                if entries.keys().any(|k| k.starts_with(&prefix)) {
                    return Err(StorageError::Io(format!("directory not empty: {cleaned}")));
                }
            }
            Some(Entry::File { .. }) => {}
            None => return Err(StorageError::NotFound(cleaned)),
        }
        entries.remove(&cleaned);
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        let cleaned = clean_rel_path(path)?;
        if cleaned.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.write().await;
        if matches!(entries.get(&cleaned), Some(Entry::File { .. })) {
            return Err(StorageError::AlreadyExists(cleaned));
        }
        Self::insert_parents(&mut entries, &cleaned);
        entries.insert(cleaned, Entry::Dir);
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError> {
        let cleaned = clean_rel_path(path)?;
        let entries = self.entries.read().await;
        entries
            .get(&cleaned)
            .map(|entry| Self::info_for(&cleaned, entry))
            .ok_or(StorageError::NotFound(cleaned))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let cleaned = clean_rel_path(path)?;
        if cleaned.is_empty() {
            return Ok(true);
        }
        Ok(self.entries.read().await.contains_key(&cleaned))
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Factory handing out pre-registered [`MemoryAdapter`]s by root name
///
/// Tests register an adapter under a root label and point an endpoint
/// at that label, mirroring how the local factory maps roots to
/// directories.
#[derive(Default)]
pub struct MemoryAdapterFactory {
    roots: std::sync::Mutex<std::collections::HashMap<String, Arc<MemoryAdapter>>>,
}

impl MemoryAdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter for a root label
    pub fn register(&self, root: &str, adapter: Arc<MemoryAdapter>) {
        self.roots
            .lock()
            .expect("memory factory lock poisoned")
            .insert(root.to_string(), adapter);
    }
}

impl IAdapterFactory for MemoryAdapterFactory {
    fn create(
        &self,
        _transport: &Transport,
        root: &str,
    ) -> Result<Arc<dyn IStorageAdapter>, StorageError> {
        let mut roots = self
            .roots
            .lock()
            .expect("memory factory lock poisoned");
        let adapter = roots
            .entry(root.to_string())
            .or_insert_with(|| Arc::new(MemoryAdapter::new()));
        Ok(adapter.clone())
    }

    fn supports(&self, transport: &Transport) -> bool {
        transport.kind == TransportKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(data: &[u8]) -> ByteStream {
        Box::new(std::io::Cursor::new(data.to_vec()))
    }

    #[tokio::test]
    async fn test_write_list_read() {
        let adapter = MemoryAdapter::new();
        adapter.write("a/b.txt", stream(b"data")).await.unwrap();

        let root = adapter.list("").await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].path, "a");
        assert!(root[0].is_dir());

        let children = adapter.list("a").await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path, "a/b.txt");
        assert_eq!(children[0].size, 4);
        assert!(!children[0].checksum.is_empty());

        assert_eq!(adapter.file_content("a/b.txt").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_list_missing_and_file() {
        let adapter = MemoryAdapter::new();
        adapter.write("f.txt", stream(b"x")).await.unwrap();

        assert!(matches!(
            adapter.list("missing").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            adapter.list("f.txt").await,
            Err(StorageError::NotDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_refuses_non_empty_dir() {
        let adapter = MemoryAdapter::new();
        adapter.write("d/f.txt", stream(b"x")).await.unwrap();

        assert!(adapter.delete("d").await.is_err());
        adapter.delete("d/f.txt").await.unwrap();
        adapter.delete("d").await.unwrap();
        assert!(!adapter.exists("d").await.unwrap());
    }

    #[tokio::test]
    async fn test_factory_returns_same_adapter_per_root() {
        let factory = MemoryAdapterFactory::new();
        let transport = Transport {
            name: "mem".into(),
            kind: TransportKind::Memory,
        };
        let a = factory.create(&transport, "left").unwrap();
        a.write("f.txt", stream(b"x")).await.unwrap();

        let b = factory.create(&transport, "left").unwrap();
        assert!(b.exists("f.txt").await.unwrap());

        let c = factory.create(&transport, "right").unwrap();
        assert!(!c.exists("f.txt").await.unwrap());
    }
}
