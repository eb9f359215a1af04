//! Sync actions and plans
//!
//! A [`SyncPlan`] is the planner's output: a totally ordered list of
//! atomic [`SyncAction`]s plus summary statistics. Plans are immutable
//! once built and each action executes at most once per run.

use serde::{Deserialize, Serialize};

use super::file::FileInfo;

/// The atomic operation an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create a directory (including parents) on the destination
    Mkdir,
    /// Stream a file from one side to the other
    Copy,
    /// Remove a file or empty directory from the destination
    Delete,
    /// Divergence the configured strategy could not resolve; no I/O
    Conflict,
    /// Deliberate no-op, kept in the plan for audit
    Skip,
}

impl ActionKind {
    /// Execution precedence: directories before contents, deletions
    /// last among the I/O actions, non-I/O actions trailing.
    pub fn rank(self) -> u8 {
        match self {
            ActionKind::Mkdir => 1,
            ActionKind::Copy => 2,
            ActionKind::Delete => 3,
            ActionKind::Conflict => 4,
            ActionKind::Skip => 5,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Mkdir => "mkdir",
            ActionKind::Copy => "copy",
            ActionKind::Delete => "delete",
            ActionKind::Conflict => "conflict",
            ActionKind::Skip => "skip",
        };
        write!(f, "{s}")
    }
}

/// Which side is authoritative for an action
///
/// Resolved against the rule's endpoint pair at execution time to pick
/// the `from` and `to` adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    SourceToTarget,
    TargetToSource,
}

impl SyncDirection {
    /// The opposite direction
    pub fn reversed(self) -> Self {
        match self {
            SyncDirection::SourceToTarget => SyncDirection::TargetToSource,
            SyncDirection::TargetToSource => SyncDirection::SourceToTarget,
        }
    }
}

/// One atomic step of a sync plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAction {
    /// Operation to perform
    pub kind: ActionKind,

    /// Authoritative side for this action
    pub direction: SyncDirection,

    /// Logical relative path; endpoints interpret it via their root
    pub path: String,

    /// Source-side observation that produced this action, if any
    pub source_info: Option<FileInfo>,

    /// Target-side observation that produced this action, if any
    pub target_info: Option<FileInfo>,

    /// Why this action was chosen; required for audit
    pub reason: String,
}

impl SyncAction {
    /// Path depth used for ordering (count of separators)
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

/// Summary statistics for a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    /// Every action, including skips and conflicts
    pub total: usize,
    pub to_copy: usize,
    pub to_delete: usize,
    pub to_mkdir: usize,
    pub conflicts: usize,
    /// Sum of the sizes of files to be copied
    pub bytes_to_sync: u64,
}

/// A complete, ordered plan for one sync run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    /// The rule that produced this plan
    pub rule_name: String,

    /// Actions in execution order
    pub actions: Vec<SyncAction>,

    /// The subset of `actions` with kind [`ActionKind::Conflict`],
    /// mirrored out for UI consumption
    pub conflicts: Vec<SyncAction>,

    /// Summary statistics
    pub stats: PlanStats,
}

impl SyncPlan {
    /// True when the plan contains no actions at all
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
