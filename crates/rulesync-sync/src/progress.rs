//! Progress reporting during plan execution
//!
//! The executor feeds transfer events into a [`Reporter`]; the
//! [`CallbackReporter`] fans them out to a user-supplied callback.
//!
//! ## Re-entrance invariant
//!
//! The callback is NEVER invoked while the reporter's internal lock is
//! held. Every site copies the update into a local value, releases the
//! lock, and only then calls out. A callback that calls back into the
//! reporter (progress bars often do) must not deadlock.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

use rulesync_core::ports::ByteStream;

/// What a [`ProgressUpdate`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// A new file transfer began
    Start,
    /// Bytes moved within the current file
    Progress,
    /// The current file finished
    Complete,
    /// The current file failed
    Error,
    /// Overall counters were adjusted directly
    Overall,
}

/// One progress event, fully materialized before the callback runs
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub kind: UpdateKind,
    pub current_file: String,
    pub current_bytes: u64,
    pub current_total: u64,
    pub files_completed: usize,
    pub files_total: usize,
    pub bytes_completed: u64,
    pub bytes_total: u64,
    pub error: Option<String>,
}

/// Sink for execution progress events
pub trait Reporter: Send + Sync {
    /// Announces the plan's total file and byte counts
    fn set_total(&self, files: usize, bytes: u64);

    /// Begins tracking one file transfer
    fn start(&self, path: &str, total_bytes: u64);

    /// Reports cumulative bytes moved for the current file
    fn update(&self, bytes_transferred: u64);

    /// Marks the current transfer finished, advancing the counters
    fn complete(&self);

    /// Reports a failure of the current transfer
    fn error(&self, message: &str);

    /// Adjusts the overall counters directly
    fn overall_progress(&self, files_completed: usize, bytes_completed: u64);
}

/// Callback signature for progress consumers
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Default)]
struct ReporterState {
    current_file: String,
    current_total: u64,
    current_bytes: u64,
    files_total: usize,
    bytes_total: u64,
    files_completed: usize,
    bytes_completed: u64,
}

impl ReporterState {
    fn snapshot(&self, kind: UpdateKind) -> ProgressUpdate {
        ProgressUpdate {
            kind,
            current_file: self.current_file.clone(),
            current_bytes: self.current_bytes,
            current_total: self.current_total,
            files_completed: self.files_completed,
            files_total: self.files_total,
            bytes_completed: self.bytes_completed,
            bytes_total: self.bytes_total,
            error: None,
        }
    }
}

/// Fan-out reporter delivering events to one callback
pub struct CallbackReporter {
    callback: ProgressCallback,
    state: Mutex<ReporterState>,
}

impl CallbackReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            state: Mutex::new(ReporterState::default()),
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut ReporterState) -> ProgressUpdate) {
        let update = {
            let mut state = self.state.lock().expect("progress state poisoned");
            f(&mut state)
        };
        // Lock released; safe for the callback to re-enter.
        (self.callback)(update);
    }
}

impl Reporter for CallbackReporter {
    fn set_total(&self, files: usize, bytes: u64) {
        let mut state = self.state.lock().expect("progress state poisoned");
        state.files_total = files;
        state.bytes_total = bytes;
    }

    fn start(&self, path: &str, total_bytes: u64) {
        self.with_state(|state| {
            state.current_file = path.to_string();
            state.current_total = total_bytes;
            state.current_bytes = 0;
            state.snapshot(UpdateKind::Start)
        });
    }

    fn update(&self, bytes_transferred: u64) {
        self.with_state(|state| {
            state.current_bytes = bytes_transferred;
            let mut update = state.snapshot(UpdateKind::Progress);
            update.bytes_completed = state.bytes_completed + bytes_transferred;
            update
        });
    }

    fn complete(&self) {
        self.with_state(|state| {
            state.files_completed += 1;
            state.bytes_completed += state.current_total;
            state.current_bytes = state.current_total;
            state.snapshot(UpdateKind::Complete)
        });
    }

    fn error(&self, message: &str) {
        self.with_state(|state| {
            let mut update = state.snapshot(UpdateKind::Error);
            update.error = Some(message.to_string());
            update
        });
    }

    fn overall_progress(&self, files_completed: usize, bytes_completed: u64) {
        self.with_state(|state| {
            state.files_completed = files_completed;
            state.bytes_completed = bytes_completed;
            state.snapshot(UpdateKind::Overall)
        });
    }
}

/// Reporter that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn set_total(&self, _files: usize, _bytes: u64) {}
    fn start(&self, _path: &str, _total_bytes: u64) {}
    fn update(&self, _bytes_transferred: u64) {}
    fn complete(&self) {}
    fn error(&self, _message: &str) {}
    fn overall_progress(&self, _files_completed: usize, _bytes_completed: u64) {}
}

/// Read stream wrapper feeding transfer counts into a reporter
///
/// Also the executor's chunk-level cancellation point: once the token
/// fires, the next read fails and the surrounding copy aborts, leaving
/// the destination's previous content intact thanks to the adapter's
/// atomic-write contract.
pub struct ProgressReader {
    inner: ByteStream,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
    transferred: u64,
}

impl ProgressReader {
    pub fn new(inner: ByteStream, reporter: Arc<dyn Reporter>, cancel: CancellationToken) -> Self {
        Self {
            inner,
            reporter,
            cancel,
            transferred: 0,
        }
    }
}

impl AsyncRead for ProgressReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        if this.cancel.is_cancelled() {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "sync cancelled",
            )));
        }

        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if n > 0 {
                    this.transferred += n as u64;
                    this.reporter.update(this.transferred);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Formats a byte count for log and status output
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{b} B"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn collecting_reporter() -> (Arc<CallbackReporter>, Arc<Mutex<Vec<ProgressUpdate>>>) {
        let seen: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = Arc::new(CallbackReporter::new(Arc::new(move |update| {
            sink.lock().unwrap().push(update);
        })));
        (reporter, seen)
    }

    #[test]
    fn test_events_in_order_with_counters() {
        let (reporter, seen) = collecting_reporter();

        reporter.set_total(2, 30);
        reporter.start("a.txt", 10);
        reporter.update(4);
        reporter.update(10);
        reporter.complete();
        reporter.start("b.txt", 20);
        reporter.complete();

        let events = seen.lock().unwrap();
        let kinds: Vec<UpdateKind> = events.iter().map(|u| u.kind).collect();
        assert_eq!(
            kinds,
            vec![
                UpdateKind::Start,
                UpdateKind::Progress,
                UpdateKind::Progress,
                UpdateKind::Complete,
                UpdateKind::Start,
                UpdateKind::Complete,
            ]
        );

        let last = events.last().unwrap();
        assert_eq!(last.files_completed, 2);
        assert_eq!(last.bytes_completed, 30);
        assert_eq!(last.files_total, 2);
    }

    #[test]
    fn test_reentrant_callback_does_not_deadlock() {
        // The callback calls back into the reporter; a lock held
        // across the callback would deadlock here.
        let slot: Arc<Mutex<Option<Arc<CallbackReporter>>>> = Arc::new(Mutex::new(None));
        let slot_in_callback = slot.clone();
        let depth = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let depth_in_callback = depth.clone();

        let reporter = Arc::new(CallbackReporter::new(Arc::new(move |_update| {
            if depth_in_callback.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                if let Some(r) = slot_in_callback.lock().unwrap().clone() {
                    r.overall_progress(1, 1);
                }
            }
        })));
        *slot.lock().unwrap() = Some(reporter.clone());

        reporter.start("a.txt", 10);
        assert!(depth.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_error_carries_message() {
        let (reporter, seen) = collecting_reporter();
        reporter.start("a.txt", 10);
        reporter.error("network error: reset");

        let events = seen.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.kind, UpdateKind::Error);
        assert_eq!(last.error.as_deref(), Some("network error: reset"));
        assert_eq!(last.current_file, "a.txt");
    }

    #[tokio::test]
    async fn test_progress_reader_reports_cumulative_bytes() {
        let (reporter, seen) = collecting_reporter();
        reporter.start("f.bin", 8);

        let stream: ByteStream = Box::new(std::io::Cursor::new(vec![7u8; 8]));
        let mut reader = ProgressReader::new(stream, reporter, CancellationToken::new());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 8);

        let events = seen.lock().unwrap();
        let progress: Vec<u64> = events
            .iter()
            .filter(|u| u.kind == UpdateKind::Progress)
            .map(|u| u.current_bytes)
            .collect();
        assert_eq!(progress.last(), Some(&8));
    }

    #[tokio::test]
    async fn test_progress_reader_fails_after_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stream: ByteStream = Box::new(std::io::Cursor::new(vec![0u8; 4]));
        let mut reader = ProgressReader::new(stream, Arc::new(NullReporter), cancel);

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
