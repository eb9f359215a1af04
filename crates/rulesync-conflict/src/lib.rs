//! rulesync conflict - diff comparison and conflict resolution
//!
//! Two pure components consumed by the planner:
//!
//! - [`MetadataComparer`] decides whether two file descriptors are
//!   identical, modified, or one-sided, using the size → mtime →
//!   checksum cascade.
//! - [`StrategyResolver`] maps a (strategy, source, target) divergence
//!   to a concrete [`SyncAction`](rulesync_core::domain::SyncAction).
//!
//! Neither component performs I/O; both are deterministic functions of
//! their inputs, which is what makes plans reproducible.

pub mod diff;
pub mod resolver;

pub use diff::{Comparer, DiffOutcome, MetadataComparer};
pub use resolver::{Resolver, StrategyResolver};
