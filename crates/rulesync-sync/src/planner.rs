//! Sync plan generation
//!
//! The planner consumes two fully materialized path→descriptor maps
//! and emits an ordered action list. It performs no I/O and never
//! fails: problems it cannot decide become `conflict` actions in the
//! plan rather than errors.
//!
//! ## Ordering
//!
//! Actions are totally ordered by `(kind rank, depth, path)`:
//! directories are created shallow→deep before the files they will
//! hold, copies follow, deletions run deep→shallow so directories
//! empty out before their own removal, and the no-I/O kinds trail in
//! path order. Identical inputs always produce identical plans, which
//! is what makes dry runs trustworthy.

use std::collections::BTreeMap;

use glob::Pattern;
use tracing::debug;

use rulesync_conflict::{Comparer, DiffOutcome, MetadataComparer, Resolver, StrategyResolver};
use rulesync_core::domain::{
    ActionKind, FileInfo, PlanStats, SyncAction, SyncDirection, SyncPlan, SyncRule,
};

/// Builds sync plans from directory snapshots
pub struct Planner {
    comparer: Box<dyn Comparer>,
    resolver: Box<dyn Resolver>,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    /// Creates a planner with the standard comparer and resolver
    pub fn new() -> Self {
        Self {
            comparer: Box::new(MetadataComparer::new()),
            resolver: Box::new(StrategyResolver::new()),
        }
    }

    /// Creates a planner with custom comparison/resolution seams
    pub fn with_components(comparer: Box<dyn Comparer>, resolver: Box<dyn Resolver>) -> Self {
        Self { comparer, resolver }
    }

    /// Plans a one-way reconciliation of `to` against `from`
    ///
    /// `from` is authoritative: entries missing from `to` are created,
    /// modified files are copied, and entries present only in `to` are
    /// deleted. Every action carries the caller's `direction`, so push
    /// passes (source, target, source→target) and pull passes the
    /// mirrored arguments.
    pub fn plan_one_way(
        &self,
        from_map: &BTreeMap<String, FileInfo>,
        to_map: &BTreeMap<String, FileInfo>,
        rule: &SyncRule,
        direction: SyncDirection,
    ) -> SyncPlan {
        let mut actions = Vec::new();

        for (path, from_info) in from_map {
            if should_ignore(path, &rule.ignore_patterns) {
                continue;
            }

            match to_map.get(path) {
                None => {
                    if from_info.is_dir() {
                        actions.push(SyncAction {
                            kind: ActionKind::Mkdir,
                            direction,
                            path: path.clone(),
                            source_info: Some(from_info.clone()),
                            target_info: None,
                            reason: "does not exist".to_string(),
                        });
                    } else {
                        actions.push(SyncAction {
                            kind: ActionKind::Copy,
                            direction,
                            path: path.clone(),
                            source_info: Some(from_info.clone()),
                            target_info: None,
                            reason: "does not exist".to_string(),
                        });
                    }
                }
                Some(to_info) if from_info.file_type != to_info.file_type => {
                    actions.push(SyncAction {
                        kind: ActionKind::Conflict,
                        direction,
                        path: path.clone(),
                        source_info: Some(from_info.clone()),
                        target_info: Some(to_info.clone()),
                        reason: "type mismatch: file vs directory".to_string(),
                    });
                }
                Some(to_info) if from_info.is_file() && to_info.is_file() => {
                    if self.comparer.compare(Some(from_info), Some(to_info))
                        == DiffOutcome::Modified
                    {
                        actions.push(SyncAction {
                            kind: ActionKind::Copy,
                            direction,
                            path: path.clone(),
                            source_info: Some(from_info.clone()),
                            target_info: Some(to_info.clone()),
                            reason: "file modified".to_string(),
                        });
                    }
                }
                Some(_) => {}
            }
        }

        for (path, to_info) in to_map {
            if should_ignore(path, &rule.ignore_patterns) {
                continue;
            }
            if !from_map.contains_key(path) {
                actions.push(SyncAction {
                    kind: ActionKind::Delete,
                    direction,
                    path: path.clone(),
                    source_info: None,
                    target_info: Some(to_info.clone()),
                    reason: "does not exist on source".to_string(),
                });
            }
        }

        finish_plan(rule, actions)
    }

    /// Plans a bidirectional reconciliation over the union of paths
    pub fn plan_two_way(
        &self,
        source_map: &BTreeMap<String, FileInfo>,
        target_map: &BTreeMap<String, FileInfo>,
        rule: &SyncRule,
    ) -> SyncPlan {
        let mut actions = Vec::new();

        let all_paths: std::collections::BTreeSet<&String> =
            source_map.keys().chain(target_map.keys()).collect();

        for path in all_paths {
            if should_ignore(path, &rule.ignore_patterns) {
                continue;
            }

            let src = source_map.get(path);
            let tgt = target_map.get(path);

            match (src, tgt) {
                (Some(src_info), None) => {
                    actions.push(one_sided_action(
                        path,
                        src_info,
                        SyncDirection::SourceToTarget,
                        "only exists on source",
                    ));
                }
                (None, Some(tgt_info)) => {
                    actions.push(one_sided_action(
                        path,
                        tgt_info,
                        SyncDirection::TargetToSource,
                        "only exists on target",
                    ));
                }
                (Some(src_info), Some(tgt_info))
                    if src_info.file_type != tgt_info.file_type =>
                {
                    actions.push(SyncAction {
                        kind: ActionKind::Conflict,
                        direction: SyncDirection::SourceToTarget,
                        path: path.clone(),
                        source_info: Some(src_info.clone()),
                        target_info: Some(tgt_info.clone()),
                        reason: "type mismatch: file vs directory".to_string(),
                    });
                }
                (Some(src_info), Some(tgt_info))
                    if src_info.is_file() && tgt_info.is_file() =>
                {
                    if self.comparer.compare(Some(src_info), Some(tgt_info))
                        == DiffOutcome::Modified
                    {
                        actions.push(self.resolver.resolve(
                            rule.conflict_strategy,
                            path,
                            Some(src_info),
                            Some(tgt_info),
                        ));
                    }
                }
                _ => {}
            }
        }

        finish_plan(rule, actions)
    }
}

fn one_sided_action(
    path: &str,
    info: &FileInfo,
    direction: SyncDirection,
    suffix: &str,
) -> SyncAction {
    let (kind, noun) = if info.is_dir() {
        (ActionKind::Mkdir, "directory")
    } else {
        (ActionKind::Copy, "file")
    };
    let (source_info, target_info) = match direction {
        SyncDirection::SourceToTarget => (Some(info.clone()), None),
        SyncDirection::TargetToSource => (None, Some(info.clone())),
    };
    SyncAction {
        kind,
        direction,
        path: path.to_string(),
        source_info,
        target_info,
        reason: format!("{noun} {suffix}"),
    }
}

/// Matches a path against ignore patterns
///
/// Each pattern is tried against the base name and the full relative
/// path; any match excludes the path. Invalid patterns never match.
pub fn should_ignore(path: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let base = path.rsplit('/').next().unwrap_or(path);
    patterns.iter().any(|raw| {
        Pattern::new(raw)
            .map(|p| p.matches(base) || p.matches(path))
            .unwrap_or(false)
    })
}

fn finish_plan(rule: &SyncRule, mut actions: Vec<SyncAction>) -> SyncPlan {
    sort_actions(&mut actions);

    let mut stats = PlanStats::default();
    let mut conflicts = Vec::new();
    for action in &actions {
        stats.total += 1;
        match action.kind {
            ActionKind::Copy => {
                stats.to_copy += 1;
                // Reverse copies carry their descriptor on the target
                // side.
                if let Some(info) = action.source_info.as_ref().or(action.target_info.as_ref()) {
                    stats.bytes_to_sync += info.size;
                }
            }
            ActionKind::Delete => stats.to_delete += 1,
            ActionKind::Mkdir => stats.to_mkdir += 1,
            ActionKind::Conflict => {
                stats.conflicts += 1;
                conflicts.push(action.clone());
            }
            ActionKind::Skip => {}
        }
    }

    debug!(
        rule = %rule.name,
        total = stats.total,
        to_copy = stats.to_copy,
        to_delete = stats.to_delete,
        conflicts = stats.conflicts,
        "plan built"
    );

    SyncPlan {
        rule_name: rule.name.clone(),
        actions,
        conflicts,
        stats,
    }
}

/// Totally orders actions by `(kind rank, depth, path)`
///
/// Deletions invert the depth key so contents go before their parent
/// directory.
fn sort_actions(actions: &mut [SyncAction]) {
    actions.sort_by(|a, b| {
        let rank = a.kind.rank().cmp(&b.kind.rank());
        if rank != std::cmp::Ordering::Equal {
            return rank;
        }
        let (da, db) = (a.depth(), b.depth());
        if da != db {
            return if a.kind == ActionKind::Delete {
                db.cmp(&da)
            } else {
                da.cmp(&db)
            };
        }
        a.path.cmp(&b.path)
    });
}
