//! End-to-end sync scenarios over real temporary directories

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use rulesync_core::domain::{
    ActionKind, ConflictStrategy, StorageError, SyncMode, SyncRule,
};
use rulesync_core::ports::IStorageAdapter;
use rulesync_storage::LocalAdapter;
use rulesync_sync::executor::{ExecutionSummary, RuleExecutor};
use rulesync_sync::progress::{CallbackReporter, ProgressUpdate, Reporter, UpdateKind};

fn rule(mode: SyncMode, strategy: ConflictStrategy, ignore: &[&str]) -> SyncRule {
    SyncRule {
        name: "flow".to_string(),
        mode,
        source_endpoint: "src".to_string(),
        target_endpoint: "tgt".to_string(),
        ignore_patterns: ignore.iter().map(|s| s.to_string()).collect(),
        conflict_strategy: strategy,
        enabled: true,
    }
}

fn write_file(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn adapters(
    src: &tempfile::TempDir,
    tgt: &tempfile::TempDir,
) -> (Arc<dyn IStorageAdapter>, Arc<dyn IStorageAdapter>) {
    (
        Arc::new(LocalAdapter::new(src.path()).unwrap()),
        Arc::new(LocalAdapter::new(tgt.path()).unwrap()),
    )
}

async fn run_push(
    source: &Arc<dyn IStorageAdapter>,
    target: &Arc<dyn IStorageAdapter>,
    rule: &SyncRule,
) -> ExecutionSummary {
    let executor = RuleExecutor::new();
    let ctx = CancellationToken::new();
    let plan = executor
        .plan(&ctx, rule, source.as_ref(), target.as_ref())
        .await
        .unwrap();
    let reporter: Arc<dyn Reporter> = Arc::new(rulesync_sync::progress::NullReporter);
    let mut summary = ExecutionSummary::default();
    executor
        .execute(&ctx, &plan, source, target, &reporter, &mut summary)
        .await
        .unwrap();
    summary
}

#[tokio::test]
async fn push_mirrors_nested_tree() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "a.txt", b"top");
    write_file(src.path(), "docs/deep/b.txt", b"nested");
    write_file(tgt.path(), "obsolete/c.txt", b"gone soon");

    let (source, target) = adapters(&src, &tgt);
    let rule = rule(SyncMode::Push, ConflictStrategy::Manual, &[]);
    let summary = run_push(&source, &target, &rule).await;

    assert_eq!(summary.files_copied, 2);
    assert_eq!(
        std::fs::read(tgt.path().join("docs/deep/b.txt")).unwrap(),
        b"nested"
    );
    assert!(!tgt.path().join("obsolete").exists());
    assert!(!tgt.path().join("obsolete/c.txt").exists());
}

#[tokio::test]
async fn push_is_idempotent_and_pull_agrees() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "data/f.bin", &[1, 2, 3, 4]);

    let (source, target) = adapters(&src, &tgt);
    let push = rule(SyncMode::Push, ConflictStrategy::Manual, &[]);
    run_push(&source, &target, &push).await;

    let executor = RuleExecutor::new();
    let ctx = CancellationToken::new();

    // Round trip: a second push plans nothing.
    let replan = executor
        .plan(&ctx, &push, source.as_ref(), target.as_ref())
        .await
        .unwrap();
    assert!(replan.is_empty(), "second push should be empty: {:?}", replan.actions);

    // And a pull right after a push also plans nothing.
    let pull = rule(SyncMode::Pull, ConflictStrategy::Manual, &[]);
    let pull_plan = executor
        .plan(&ctx, &pull, source.as_ref(), target.as_ref())
        .await
        .unwrap();
    assert!(pull_plan.is_empty(), "pull after push should be empty: {:?}", pull_plan.actions);
}

#[tokio::test]
async fn ignore_patterns_prune_traversal_and_protect_target() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "keep.txt", b"keep");
    write_file(src.path(), "debug.log", b"noise");
    write_file(src.path(), "cache/blob.bin", b"big");
    // Target-side ignored file must survive the delete pass.
    write_file(tgt.path(), "local.log", b"mine");

    let (source, target) = adapters(&src, &tgt);
    let rule = rule(
        SyncMode::Push,
        ConflictStrategy::Manual,
        &["*.log", "cache"],
    );
    run_push(&source, &target, &rule).await;

    assert!(tgt.path().join("keep.txt").exists());
    assert!(!tgt.path().join("debug.log").exists());
    assert!(!tgt.path().join("cache").exists());
    assert!(tgt.path().join("local.log").exists());
}

#[tokio::test]
async fn two_way_newest_wins_updates_older_side() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "f.txt", b"old content");
    write_file(tgt.path(), "f.txt", b"new content!");

    // Make the target strictly newer.
    let old = filetime_from_secs(1_700_000_000);
    let new = filetime_from_secs(1_700_000_100);
    set_mtime(&src.path().join("f.txt"), old);
    set_mtime(&tgt.path().join("f.txt"), new);

    let (source, target) = adapters(&src, &tgt);
    let executor = RuleExecutor::new();
    let ctx = CancellationToken::new();
    let rule = rule(SyncMode::TwoWay, ConflictStrategy::KeepNewest, &[]);
    let plan = executor
        .plan(&ctx, &rule, source.as_ref(), target.as_ref())
        .await
        .unwrap();

    assert_eq!(plan.actions.len(), 1);
    assert_eq!(plan.actions[0].kind, ActionKind::Copy);
    assert_eq!(plan.actions[0].reason, "target is newer");

    let reporter: Arc<dyn Reporter> = Arc::new(rulesync_sync::progress::NullReporter);
    let mut summary = ExecutionSummary::default();
    executor
        .execute(&ctx, &plan, &source, &target, &reporter, &mut summary)
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(src.path().join("f.txt")).unwrap(),
        b"new content!"
    );
}

#[tokio::test]
async fn two_way_manual_leaves_both_sides_untouched() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "f.txt", b"source version");
    write_file(tgt.path(), "f.txt", b"target version ");

    let (source, target) = adapters(&src, &tgt);
    let executor = RuleExecutor::new();
    let ctx = CancellationToken::new();
    let rule = rule(SyncMode::TwoWay, ConflictStrategy::Manual, &[]);
    let plan = executor
        .plan(&ctx, &rule, source.as_ref(), target.as_ref())
        .await
        .unwrap();

    assert_eq!(plan.stats.conflicts, 1);

    let reporter: Arc<dyn Reporter> = Arc::new(rulesync_sync::progress::NullReporter);
    let mut summary = ExecutionSummary::default();
    executor
        .execute(&ctx, &plan, &source, &target, &reporter, &mut summary)
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(src.path().join("f.txt")).unwrap(),
        b"source version"
    );
    assert_eq!(
        std::fs::read(tgt.path().join("f.txt")).unwrap(),
        b"target version "
    );
}

#[tokio::test]
async fn progress_events_cover_each_copied_file() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "one.txt", b"11111");
    write_file(src.path(), "two.txt", b"222");

    let (source, target) = adapters(&src, &tgt);
    let executor = RuleExecutor::new();
    let ctx = CancellationToken::new();
    let rule = rule(SyncMode::Push, ConflictStrategy::Manual, &[]);
    let plan = executor
        .plan(&ctx, &rule, source.as_ref(), target.as_ref())
        .await
        .unwrap();

    let seen: Arc<std::sync::Mutex<Vec<ProgressUpdate>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let reporter: Arc<dyn Reporter> = Arc::new(CallbackReporter::new(Arc::new(move |update| {
        sink.lock().unwrap().push(update);
    })));

    let mut summary = ExecutionSummary::default();
    executor
        .execute(&ctx, &plan, &source, &target, &reporter, &mut summary)
        .await
        .unwrap();

    let events = seen.lock().unwrap();
    let starts: Vec<&str> = events
        .iter()
        .filter(|u| u.kind == UpdateKind::Start)
        .map(|u| u.current_file.as_str())
        .collect();
    assert_eq!(starts, vec!["one.txt", "two.txt"]);

    let completes = events
        .iter()
        .filter(|u| u.kind == UpdateKind::Complete)
        .count();
    assert_eq!(completes, 2);

    let last = events.last().unwrap();
    assert_eq!(last.files_completed, 2);
    assert_eq!(last.bytes_completed, 8);
}

#[tokio::test]
async fn failed_copy_aborts_remaining_actions() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "a-first.txt", b"a");
    write_file(src.path(), "z-last.txt", b"z");

    let (source, target) = adapters(&src, &tgt);
    let executor = RuleExecutor::new();
    let ctx = CancellationToken::new();
    let rule = rule(SyncMode::Push, ConflictStrategy::Manual, &[]);
    let plan = executor
        .plan(&ctx, &rule, source.as_ref(), target.as_ref())
        .await
        .unwrap();

    // Sabotage the first copy after planning.
    std::fs::remove_file(src.path().join("a-first.txt")).unwrap();

    let reporter: Arc<dyn Reporter> = Arc::new(rulesync_sync::progress::NullReporter);
    let mut summary = ExecutionSummary::default();
    let err = executor
        .execute(&ctx, &plan, &source, &target, &reporter, &mut summary)
        .await
        .unwrap_err();

    match err {
        rulesync_core::domain::SyncError::ActionFailed { path, source, .. } => {
            assert_eq!(path, "a-first.txt");
            assert!(matches!(source, StorageError::NotFound(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(
        !tgt.path().join("z-last.txt").exists(),
        "fail-fast must not reach later actions"
    );
    assert_eq!(plan.stats.to_copy, 2, "the plan itself is unchanged");
}

fn filetime_from_secs(secs: i64) -> std::time::SystemTime {
    std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs as u64)
}

fn set_mtime(path: &Path, time: std::time::SystemTime) {
    let file = std::fs::File::options().append(true).open(path).unwrap();
    file.set_modified(time).unwrap();
    drop(file);
}
