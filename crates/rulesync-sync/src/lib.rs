//! rulesync sync - planning and execution machinery
//!
//! This crate turns declarative rules into work and carries that work
//! out safely:
//!
//! - [`planner`] builds a deterministic, totally ordered action list
//!   from two directory snapshots
//! - [`executor`] lists both trees, invokes the planner, and applies
//!   the resulting plan action by action
//! - [`progress`] fans execution events out to a callback without ever
//!   holding its lock across the call
//! - [`lock`] provides the cross-process file lock with stale-holder
//!   reclamation
//! - [`scheduler`] drives periodic runs with a single-shot lifecycle
//! - [`service`] wires rules, adapters, the lock, and history into
//!   complete runs
//!
//! ## Concurrency model
//!
//! One scheduler tick runs at a time; within a tick, rules run
//! sequentially; within a rule, actions execute strictly in planner
//! order. Cancellation flows through a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) observed
//! between listed entries, between actions, and inside copy streams.

pub mod executor;
pub mod lock;
pub mod planner;
pub mod progress;
pub mod scheduler;
pub mod service;

pub use executor::RuleExecutor;
pub use lock::{FileLock, LockError, LockInfo};
pub use planner::Planner;
pub use progress::{CallbackReporter, NullReporter, ProgressReader, ProgressUpdate, Reporter};
pub use scheduler::{IntervalScheduler, SchedulerConfig, SchedulerStatus, SyncRunner};
pub use service::SyncService;
