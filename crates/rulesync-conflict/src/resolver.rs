//! Strategy-driven conflict resolution
//!
//! When the planner finds a path modified on both sides of a two-way
//! rule, the resolver turns the rule's strategy into a concrete
//! action. Resolution is a pure function: the same inputs always
//! produce the same action, so plans stay deterministic.

use tracing::trace;

use rulesync_core::domain::{
    ActionKind, ConflictStrategy, FileInfo, SyncAction, SyncDirection,
};

/// Maps a divergence to a concrete action
pub trait Resolver: Send + Sync {
    fn resolve(
        &self,
        strategy: ConflictStrategy,
        path: &str,
        src: Option<&FileInfo>,
        tgt: Option<&FileInfo>,
    ) -> SyncAction;
}

/// The standard strategy table
///
/// "Local" means the target endpoint (where the user works); "remote"
/// means the source endpoint. Keep-newest compares mtimes strictly and
/// degrades to skip or conflict when they tie.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyResolver;

impl StrategyResolver {
    pub fn new() -> Self {
        Self
    }
}

fn action(
    kind: ActionKind,
    direction: SyncDirection,
    path: &str,
    src: Option<&FileInfo>,
    tgt: Option<&FileInfo>,
    reason: &str,
) -> SyncAction {
    SyncAction {
        kind,
        direction,
        path: path.to_string(),
        source_info: src.cloned(),
        target_info: tgt.cloned(),
        reason: reason.to_string(),
    }
}

impl Resolver for StrategyResolver {
    fn resolve(
        &self,
        strategy: ConflictStrategy,
        path: &str,
        src: Option<&FileInfo>,
        tgt: Option<&FileInfo>,
    ) -> SyncAction {
        // The resolver never dereferences a missing side.
        let (src_info, tgt_info) = match (src, tgt) {
            (Some(s), Some(t)) => (s, t),
            _ => {
                return action(
                    ActionKind::Conflict,
                    SyncDirection::SourceToTarget,
                    path,
                    src,
                    tgt,
                    "manual resolution required: nil file info",
                );
            }
        };

        trace!(%path, %strategy, "resolving conflict");

        match strategy {
            ConflictStrategy::KeepLocal => action(
                ActionKind::Skip,
                SyncDirection::SourceToTarget,
                path,
                src,
                tgt,
                "keeping local version (conflict strategy)",
            ),

            ConflictStrategy::KeepRemote => action(
                ActionKind::Copy,
                SyncDirection::SourceToTarget,
                path,
                src,
                tgt,
                "using remote version (conflict strategy)",
            ),

            ConflictStrategy::KeepNewest => {
                if src_info.mtime > tgt_info.mtime {
                    action(
                        ActionKind::Copy,
                        SyncDirection::SourceToTarget,
                        path,
                        src,
                        tgt,
                        "source is newer",
                    )
                } else if tgt_info.mtime > src_info.mtime {
                    action(
                        ActionKind::Copy,
                        SyncDirection::TargetToSource,
                        path,
                        src,
                        tgt,
                        "target is newer",
                    )
                } else if src_info.size != tgt_info.size {
                    action(
                        ActionKind::Conflict,
                        SyncDirection::SourceToTarget,
                        path,
                        src,
                        tgt,
                        "identical time but different size",
                    )
                } else if !src_info.checksum.is_empty() && !tgt_info.checksum.is_empty() {
                    if src_info.checksum == tgt_info.checksum {
                        action(
                            ActionKind::Skip,
                            SyncDirection::SourceToTarget,
                            path,
                            src,
                            tgt,
                            "checksum match",
                        )
                    } else {
                        action(
                            ActionKind::Conflict,
                            SyncDirection::SourceToTarget,
                            path,
                            src,
                            tgt,
                            "identical time but different content",
                        )
                    }
                } else {
                    action(
                        ActionKind::Skip,
                        SyncDirection::SourceToTarget,
                        path,
                        src,
                        tgt,
                        "identical modification time and size",
                    )
                }
            }

            ConflictStrategy::Manual => action(
                ActionKind::Conflict,
                SyncDirection::SourceToTarget,
                path,
                src,
                tgt,
                "manual resolution required",
            ),
        }
    }
}
