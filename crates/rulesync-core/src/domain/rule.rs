//! Sync rules, endpoints, and transports
//!
//! A [`SyncRule`] is the declarative input to the engine: which two
//! endpoints to reconcile, in which direction, with which exclusions
//! and conflict policy. Rules are immutable once loaded; the engine
//! never mutates them.

use serde::{Deserialize, Serialize};

use super::errors::SyncError;

/// Direction of reconciliation for a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Source is authoritative; target is reconciled to it
    Push,
    /// Target is authoritative; source is reconciled to it
    Pull,
    /// Both sides contribute; conflicts go through the resolver
    TwoWay,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncMode::Push => "push",
            SyncMode::Pull => "pull",
            SyncMode::TwoWay => "two-way",
        };
        write!(f, "{s}")
    }
}

/// Policy applied when both sides of a path have diverged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Keep the target endpoint's version (where the user works)
    KeepLocal,
    /// Keep the source endpoint's version
    KeepRemote,
    /// Keep whichever side has the strictly newer mtime
    KeepNewest,
    /// Flag for manual resolution; never pick a side automatically
    Manual,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictStrategy::KeepLocal => "keep-local",
            ConflictStrategy::KeepRemote => "keep-remote",
            ConflictStrategy::KeepNewest => "keep-newest",
            ConflictStrategy::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

/// A declarative synchronization relationship between two endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRule {
    /// Unique identifier for this rule
    pub name: String,

    /// Reconciliation direction
    pub mode: SyncMode,

    /// Name of the authoritative endpoint (for push)
    pub source_endpoint: String,

    /// Name of the reconciled endpoint (for push)
    pub target_endpoint: String,

    /// Glob patterns excluding paths from planning and traversal
    ///
    /// Each pattern is matched against both the base name and the full
    /// relative path; any match excludes the path entirely. Pattern
    /// order is irrelevant.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Conflict policy for two-way rules
    pub conflict_strategy: ConflictStrategy,

    /// Disabled rules are kept in configuration but never run
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SyncRule {
    /// Checks structural validity of the rule
    ///
    /// A rule must have a name and two distinct endpoints. Endpoint
    /// resolution (does the name exist, does its transport exist) is
    /// the configuration layer's job.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.name.is_empty() {
            return Err(SyncError::InvalidRule("rule name cannot be empty".into()));
        }
        if self.source_endpoint.is_empty() || self.target_endpoint.is_empty() {
            return Err(SyncError::InvalidRule(format!(
                "rule '{}' must name both endpoints",
                self.name
            )));
        }
        if self.source_endpoint == self.target_endpoint {
            return Err(SyncError::CircularDependency(self.name.clone()));
        }
        Ok(())
    }
}

/// Storage back-end family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Local filesystem
    Local,
    /// In-memory tree (tests, embedding)
    Memory,
    /// Cloud object store; requires a registered adapter factory
    ObjectStore,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Local => "local",
            TransportKind::Memory => "memory",
            TransportKind::ObjectStore => "object-store",
        };
        write!(f, "{s}")
    }
}

/// A named storage back-end configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    /// Unique identifier
    pub name: String,

    /// Back-end family
    pub kind: TransportKind,
}

/// A (transport, root path) pair naming one side of a sync relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unique identifier
    pub name: String,

    /// Transport name reference
    pub transport: String,

    /// Root path within the transport
    pub root: String,
}
