//! Rule execution: traverse, plan, apply
//!
//! The executor owns the two phases of a sync run. The plan phase
//! lists both trees depth-first (pruning ignored subtrees so excluded
//! directories cost no I/O), materializes complete path→descriptor
//! maps, and hands them to the planner. The execute phase walks the
//! plan strictly in order, streaming copies through the progress
//! reporter and failing fast on the first error.
//!
//! Cancellation is observed between listed entries, between actions,
//! and at every read chunk inside a copy; an abandoned copy never
//! leaves a partial file visible because adapter writes are atomic.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use rulesync_core::domain::{
    ActionKind, FileInfo, StorageError, SyncAction, SyncDirection, SyncError, SyncMode, SyncPlan,
    SyncRule,
};
use rulesync_core::ports::IStorageAdapter;

use crate::planner::{should_ignore, Planner};
use crate::progress::{ProgressReader, Reporter};

/// What the execute phase actually moved
///
/// Filled in even when the run aborts partway, so callers can record
/// partial outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub dirs_created: u64,
    pub files_deleted: u64,
}

impl ExecutionSummary {
    /// True when at least one action completed
    pub fn any_progress(&self) -> bool {
        self.files_copied > 0 || self.dirs_created > 0 || self.files_deleted > 0
    }
}

/// Plans and executes sync runs for one rule at a time
pub struct RuleExecutor {
    planner: Planner,
}

impl Default for RuleExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            planner: Planner::new(),
        }
    }

    /// Builds a plan for a rule from the current state of both trees
    #[instrument(skip_all, fields(rule = %rule.name, mode = %rule.mode))]
    pub async fn plan(
        &self,
        ctx: &CancellationToken,
        rule: &SyncRule,
        source: &dyn IStorageAdapter,
        target: &dyn IStorageAdapter,
    ) -> Result<SyncPlan, SyncError> {
        rule.validate()?;

        let source_map = list_tree(ctx, source, &rule.ignore_patterns).await?;
        let target_map = list_tree(ctx, target, &rule.ignore_patterns).await?;
        debug!(
            source_entries = source_map.len(),
            target_entries = target_map.len(),
            "trees listed"
        );

        let plan = match rule.mode {
            SyncMode::Push => self.planner.plan_one_way(
                &source_map,
                &target_map,
                rule,
                SyncDirection::SourceToTarget,
            ),
            SyncMode::Pull => self.planner.plan_one_way(
                &target_map,
                &source_map,
                rule,
                SyncDirection::TargetToSource,
            ),
            SyncMode::TwoWay => self.planner.plan_two_way(&source_map, &target_map, rule),
        };

        Ok(plan)
    }

    /// Applies a plan action by action, in planner order
    ///
    /// Fails fast: the first action error aborts the run, wrapped with
    /// the action's kind and path. `summary` reflects whatever
    /// completed before the abort.
    #[instrument(skip_all, fields(rule = %plan.rule_name, actions = plan.actions.len()))]
    pub async fn execute(
        &self,
        ctx: &CancellationToken,
        plan: &SyncPlan,
        source: &Arc<dyn IStorageAdapter>,
        target: &Arc<dyn IStorageAdapter>,
        reporter: &Arc<dyn Reporter>,
        summary: &mut ExecutionSummary,
    ) -> Result<(), SyncError> {
        reporter.set_total(plan.stats.to_copy, plan.stats.bytes_to_sync);

        for action in &plan.actions {
            if ctx.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            if let Err(e) = self
                .execute_action(ctx, action, source, target, reporter, summary)
                .await
            {
                // A copy interrupted by cancellation surfaces as an
                // I/O failure; report the cancellation instead.
                if ctx.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                reporter.error(&e.to_string());
                return Err(SyncError::ActionFailed {
                    kind: action.kind,
                    path: action.path.clone(),
                    source: e,
                });
            }
        }

        info!(
            files = summary.files_copied,
            bytes = summary.bytes_copied,
            "plan executed"
        );
        Ok(())
    }

    async fn execute_action(
        &self,
        ctx: &CancellationToken,
        action: &SyncAction,
        source: &Arc<dyn IStorageAdapter>,
        target: &Arc<dyn IStorageAdapter>,
        reporter: &Arc<dyn Reporter>,
        summary: &mut ExecutionSummary,
    ) -> Result<(), StorageError> {
        // Resolve which adapter is authoritative for this action.
        let (from, to) = match action.direction {
            SyncDirection::SourceToTarget => (source, target),
            SyncDirection::TargetToSource => (target, source),
        };

        match action.kind {
            ActionKind::Mkdir => {
                to.mkdir(&action.path).await?;
                summary.dirs_created += 1;
                Ok(())
            }

            ActionKind::Copy => {
                let size = action
                    .source_info
                    .as_ref()
                    .or(action.target_info.as_ref())
                    .map(|i| i.size)
                    .unwrap_or(0);

                reporter.start(&action.path, size);
                let reader = from.read(&action.path).await?;
                let tracked = ProgressReader::new(reader, reporter.clone(), ctx.clone());
                to.write(&action.path, Box::new(tracked)).await?;
                reporter.complete();

                summary.files_copied += 1;
                summary.bytes_copied += size;
                Ok(())
            }

            ActionKind::Delete => {
                match to.delete(&action.path).await {
                    Ok(()) => {
                        summary.files_deleted += 1;
                        Ok(())
                    }
                    // Already gone is the desired end state.
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(e),
                }
            }

            ActionKind::Skip | ActionKind::Conflict => Ok(()),
        }
    }
}

/// Recursively lists an adapter's tree into a path→descriptor map
///
/// Depth-first; ignored paths are pruned during traversal so excluded
/// subtrees are never listed. Cancellation is checked between entries
/// and discards the partial result.
pub async fn list_tree(
    ctx: &CancellationToken,
    adapter: &dyn IStorageAdapter,
    ignore_patterns: &[String],
) -> Result<BTreeMap<String, FileInfo>, SyncError> {
    let mut map = BTreeMap::new();
    list_into(ctx, adapter, String::new(), ignore_patterns, &mut map).await?;
    Ok(map)
}

fn list_into<'a>(
    ctx: &'a CancellationToken,
    adapter: &'a dyn IStorageAdapter,
    prefix: String,
    ignore_patterns: &'a [String],
    map: &'a mut BTreeMap<String, FileInfo>,
) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>> {
    Box::pin(async move {
        let entries = adapter.list(&prefix).await?;

        for entry in entries {
            if ctx.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            if should_ignore(&entry.path, ignore_patterns) {
                debug!(path = %entry.path, "pruning ignored subtree");
                continue;
            }

            let path = entry.path.clone();
            let is_dir = entry.is_dir();
            map.insert(path.clone(), entry);

            if is_dir {
                list_into(ctx, adapter, path, ignore_patterns, map).await?;
            }
        }
        Ok(())
    })
}
