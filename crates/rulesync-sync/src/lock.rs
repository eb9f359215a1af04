//! Cross-process file lock
//!
//! Prevents two sync runs from operating on overlapping endpoints,
//! whether they come from this process, another process on this host,
//! or another host sharing the lock directory.
//!
//! The lock is a single JSON file created with exclusive-create
//! semantics. Staleness is decided differently per host: a same-host
//! holder is stale only when its process is provably gone (a live
//! process is never stale, no matter how long it has run), while a
//! foreign host's holder is presumed gone after a timeout because its
//! liveness cannot be observed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the lock file inside the lock directory
pub const LOCK_FILE_NAME: &str = ".rulesync.lock";

/// Default cross-host staleness timeout
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Identity of a lock holder, serialized into the lock file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rule_name: String,
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PID {} on {} since {}, rule: {}",
            self.pid,
            self.hostname,
            self.start_time.to_rfc3339(),
            if self.rule_name.is_empty() {
                "<none>"
            } else {
                &self.rule_name
            }
        )
    }
}

/// Lock acquisition and release failures
#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder owns the lock; carries its identity
    #[error("lock is held by another process ({holder})")]
    Busy { holder: LockInfo },

    /// The on-disk lock no longer matches this instance
    ///
    /// Reported on release; the file is left in place for the operator.
    #[error("lock was stolen by another process")]
    Stolen,

    #[error("invalid lock file format: {0}")]
    Corrupt(String),

    #[error("lock i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// File-based cross-process mutex
pub struct FileLock {
    lock_path: PathBuf,
    stale_timeout: Duration,
    hostname: String,
    /// Snapshot of what this instance last wrote; `None` when not held
    info: Option<LockInfo>,
}

impl FileLock {
    /// Creates a lock rooted in `lock_dir`, creating the directory
    pub fn new(lock_dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(lock_dir)?;
        Ok(Self {
            lock_path: lock_dir.join(LOCK_FILE_NAME),
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            hostname: local_hostname(),
            info: None,
        })
    }

    /// Overrides the cross-host staleness timeout
    pub fn set_stale_timeout(&mut self, timeout: Duration) {
        self.stale_timeout = timeout;
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Acquires the lock for a rule
    ///
    /// Re-acquiring while already held updates `rule_name` in the file
    /// AND in this instance's snapshot; release verifies both, so a
    /// one-sided update would later misreport the lock as stolen.
    pub fn acquire(&mut self, rule_name: &str) -> Result<(), LockError> {
        if self.info.is_some() {
            if let Ok(existing) = self.read_info() {
                if self.held_by_this_instance(&existing) {
                    let mut updated = existing;
                    updated.rule_name = rule_name.to_string();
                    self.write_info(&updated)?;
                    if let Some(info) = self.info.as_mut() {
                        info.rule_name = rule_name.to_string();
                    }
                    debug!(rule = rule_name, "re-acquired held lock");
                    return Ok(());
                }
            }
        }

        match self.read_info() {
            Ok(existing) => {
                if self.is_stale(&existing) {
                    info!(holder = %existing, "removing stale lock");
                    std::fs::remove_file(&self.lock_path)?;
                } else {
                    return Err(LockError::Busy { holder: existing });
                }
            }
            Err(LockError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(LockError::Corrupt(reason)) => {
                // An unreadable lock file cannot name a live holder.
                warn!(%reason, "removing corrupt lock file");
                std::fs::remove_file(&self.lock_path)?;
            }
            Err(e) => return Err(e),
        }

        let info = LockInfo {
            pid: std::process::id(),
            hostname: self.hostname.clone(),
            start_time: Utc::now(),
            rule_name: rule_name.to_string(),
        };

        let file = match exclusive_create(&self.lock_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Lost the race between the staleness check and create.
                let holder = self.read_info()?;
                return Err(LockError::Busy { holder });
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = serde_json::to_writer_pretty(&file, &info) {
            let _ = std::fs::remove_file(&self.lock_path);
            return Err(LockError::Corrupt(e.to_string()));
        }
        drop(file);

        debug!(rule = rule_name, pid = info.pid, "lock acquired");
        self.info = Some(info);
        Ok(())
    }

    /// Releases the lock if this instance still owns it
    ///
    /// Returns [`LockError::Stolen`] without deleting the file when
    /// the on-disk identity no longer matches; recovery is an operator
    /// decision.
    pub fn release(&mut self) -> Result<(), LockError> {
        if self.info.is_none() {
            return Ok(());
        }

        let existing = match self.read_info() {
            Ok(info) => info,
            Err(LockError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.info = None;
                return Ok(());
            }
            Err(e) => {
                self.info = None;
                return Err(e);
            }
        };

        if !self.held_by_this_instance(&existing) {
            self.info = None;
            return Err(LockError::Stolen);
        }

        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("lock released");
        self.info = None;
        Ok(())
    }

    /// True when a non-stale lock exists on disk
    pub fn is_locked(&self) -> bool {
        match self.read_info() {
            Ok(info) => !self.is_stale(&info),
            Err(_) => false,
        }
    }

    /// Identity of the current (non-stale) holder, if any
    pub fn holder(&self) -> Result<Option<LockInfo>, LockError> {
        match self.read_info() {
            Ok(info) => {
                if self.is_stale(&info) {
                    Ok(None)
                } else {
                    Ok(Some(info))
                }
            }
            Err(LockError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Unconditionally removes the lock file; operator use only
    pub fn force_release(&mut self) -> Result<(), LockError> {
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        warn!("lock force-released");
        self.info = None;
        Ok(())
    }

    fn read_info(&self) -> Result<LockInfo, LockError> {
        let data = std::fs::read(&self.lock_path)?;
        serde_json::from_slice(&data).map_err(|e| LockError::Corrupt(e.to_string()))
    }

    fn write_info(&self, info: &LockInfo) -> Result<(), LockError> {
        let data =
            serde_json::to_vec_pretty(info).map_err(|e| LockError::Corrupt(e.to_string()))?;
        std::fs::write(&self.lock_path, data)?;
        Ok(())
    }

    /// Staleness rule: same host goes by process liveness alone, other
    /// hosts by elapsed time since acquisition.
    fn is_stale(&self, info: &LockInfo) -> bool {
        if info.hostname == self.hostname {
            return !process_alive(info.pid);
        }
        let age = Utc::now().signed_duration_since(info.start_time);
        age.to_std()
            .map(|age| age > self.stale_timeout)
            .unwrap_or(false)
    }

    fn held_by_this_instance(&self, on_disk: &LockInfo) -> bool {
        let Some(mine) = self.info.as_ref() else {
            return false;
        };
        on_disk.pid == std::process::id()
            && on_disk.hostname == self.hostname
            && on_disk.start_time == mine.start_time
            && on_disk.rule_name == mine.rule_name
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(unix)]
fn exclusive_create(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)
}

#[cfg(not(unix))]
fn exclusive_create(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
}

/// Probes whether a process exists on this host
///
/// Signal 0 checks existence without delivering anything; EPERM means
/// the process exists but belongs to another user, which still counts
/// as alive.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Liveness is not observable here; err on the side of a live holder
/// and let the cross-host timeout reclaim abandoned locks.
#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
