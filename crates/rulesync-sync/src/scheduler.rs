//! Interval-based sync scheduling
//!
//! The [`IntervalScheduler`] owns a background task that fires a
//! [`SyncRunner`] on a fixed period. Its lifecycle is single-shot:
//! once stopped it can never be restarted, which keeps the "is the
//! loop alive" question answerable from a single flag.
//!
//! ## Tick semantics
//!
//! At most one tick executes at a time. When a tick's work outlasts
//! the interval the next tick is deferred rather than run concurrently
//! (missed-tick delay). Within a tick, rules run sequentially and
//! their errors are aggregated; one failing rule does not starve the
//! rest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callback the scheduler fires on each tick
///
/// An empty `rule_name` means "all enabled rules, chosen by the
/// runner".
#[async_trait::async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run_sync(&self, ctx: &CancellationToken, rule_name: &str) -> anyhow::Result<()>;
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period between runs; must be non-zero
    pub interval: Duration,

    /// Rules to run each tick; empty delegates the choice to the runner
    pub rules: Vec<String>,
}

/// Lifecycle and counters, as observed at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub last_error: String,
}

/// Scheduler lifecycle violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("interval must be positive")]
    InvalidInterval,

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler cannot be restarted after stop")]
    AlreadyStopped,
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    stopped: bool,
}

#[derive(Default)]
struct Stats {
    last_run_time: Option<DateTime<Utc>>,
    next_run_time: Option<DateTime<Utc>>,
    total_runs: u64,
    successful_runs: u64,
    failed_runs: u64,
    last_error: String,
}

/// Periodic driver for sync runs
pub struct IntervalScheduler {
    config: SchedulerConfig,
    runner: Arc<dyn SyncRunner>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    stats: Arc<Mutex<Stats>>,
    /// Cancelling this is the stop signal; cancellation is idempotent,
    /// which is what makes close-once trivial here.
    stop: CancellationToken,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new(
        config: SchedulerConfig,
        runner: Arc<dyn SyncRunner>,
    ) -> Result<Self, SchedulerError> {
        if config.interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }
        Ok(Self {
            config,
            runner,
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
            stats: Arc::new(Mutex::new(Stats::default())),
            stop: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    /// Starts the background loop
    ///
    /// Fails if the loop is running or has ever been stopped.
    pub fn start(&self, ctx: CancellationToken) -> Result<(), SchedulerError> {
        {
            let mut lifecycle = self.lifecycle.lock().expect("scheduler lifecycle poisoned");
            if lifecycle.running {
                return Err(SchedulerError::AlreadyRunning);
            }
            if lifecycle.stopped {
                return Err(SchedulerError::AlreadyStopped);
            }
            lifecycle.running = true;
        }

        {
            let mut stats = self.stats.lock().expect("scheduler stats poisoned");
            stats.next_run_time = Some(
                Utc::now()
                    + chrono::Duration::from_std(self.config.interval)
                        .unwrap_or_else(|_| chrono::Duration::zero()),
            );
        }

        let interval = self.config.interval;
        let rules = self.config.rules.clone();
        let runner = self.runner.clone();
        let lifecycle = self.lifecycle.clone();
        let stats = self.stats.clone();
        let stop = self.stop.clone();

        let task = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs_f64(), "scheduler started");

            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        debug!("scheduler context cancelled");
                        break;
                    }
                    _ = stop.cancelled() => {
                        debug!("scheduler stop requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_tick(&ctx, &runner, &rules, &stats, interval).await;
                    }
                }
            }

            let mut lifecycle = lifecycle.lock().expect("scheduler lifecycle poisoned");
            lifecycle.running = false;
            lifecycle.stopped = true;
            info!("scheduler stopped");
        });

        *self.handle.lock().expect("scheduler handle poisoned") = Some(task);
        Ok(())
    }

    /// Stops the loop and waits for it to exit; safe from any state
    pub async fn stop(&self) {
        self.stop.cancel();

        let handle = self
            .handle
            .lock()
            .expect("scheduler handle poisoned")
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler task panicked");
            }
        }

        let mut lifecycle = self.lifecycle.lock().expect("scheduler lifecycle poisoned");
        lifecycle.running = false;
        lifecycle.stopped = true;
    }

    /// Snapshot of the current lifecycle and counters
    pub fn status(&self) -> SchedulerStatus {
        let lifecycle = self.lifecycle.lock().expect("scheduler lifecycle poisoned");
        let stats = self.stats.lock().expect("scheduler stats poisoned");
        SchedulerStatus {
            running: lifecycle.running,
            last_run_time: stats.last_run_time,
            next_run_time: stats.next_run_time,
            total_runs: stats.total_runs,
            successful_runs: stats.successful_runs,
            failed_runs: stats.failed_runs,
            last_error: stats.last_error.clone(),
        }
    }
}

/// Executes one tick: every configured rule, sequentially
async fn run_tick(
    ctx: &CancellationToken,
    runner: &Arc<dyn SyncRunner>,
    rules: &[String],
    stats: &Arc<Mutex<Stats>>,
    interval: Duration,
) {
    {
        let mut stats = stats.lock().expect("scheduler stats poisoned");
        stats.last_run_time = Some(Utc::now());
        stats.total_runs += 1;
        stats.next_run_time = Some(
            Utc::now()
                + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero()),
        );
    }

    // No explicit rule list: one run with the choice delegated.
    let all = [String::new()];
    let batch: &[String] = if rules.is_empty() { &all } else { rules };

    let mut errors: Vec<anyhow::Error> = Vec::new();
    for rule_name in batch {
        if let Err(e) = runner.run_sync(ctx, rule_name).await {
            warn!(rule = %rule_name, error = %e, "scheduled sync failed");
            errors.push(e);
        }
    }

    let mut stats = stats.lock().expect("scheduler stats poisoned");
    if errors.is_empty() {
        stats.successful_runs += 1;
        stats.last_error.clear();
    } else {
        stats.failed_runs += 1;
        stats.last_error = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
        fail_rule: Option<String>,
        seen_rules: Mutex<Vec<String>>,
    }

    impl CountingRunner {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
                fail_rule: None,
                seen_rules: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(rule: &str) -> Self {
            let mut runner = Self::new(Duration::ZERO);
            runner.fail_rule = Some(rule.to_string());
            runner
        }
    }

    #[async_trait::async_trait]
    impl SyncRunner for CountingRunner {
        async fn run_sync(&self, _ctx: &CancellationToken, rule_name: &str) -> anyhow::Result<()> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            self.seen_rules.lock().unwrap().push(rule_name.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match &self.fail_rule {
                Some(fail) if fail == rule_name => anyhow::bail!("rule {rule_name} failed"),
                _ => Ok(()),
            }
        }
    }

    fn scheduler_with(
        runner: Arc<CountingRunner>,
        interval: Duration,
        rules: &[&str],
    ) -> IntervalScheduler {
        IntervalScheduler::new(
            SchedulerConfig {
                interval,
                rules: rules.iter().map(|s| s.to_string()).collect(),
            },
            runner,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_interval_rejected() {
        let runner = Arc::new(CountingRunner::new(Duration::ZERO));
        assert_eq!(
            IntervalScheduler::new(
                SchedulerConfig {
                    interval: Duration::ZERO,
                    rules: vec![],
                },
                runner,
            )
            .err(),
            Some(SchedulerError::InvalidInterval)
        );
    }

    #[tokio::test]
    async fn test_ticks_invoke_runner() {
        let runner = Arc::new(CountingRunner::new(Duration::ZERO));
        let scheduler = scheduler_with(runner.clone(), Duration::from_millis(10), &[]);

        scheduler.start(CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        assert!(runner.calls.load(Ordering::SeqCst) >= 2);
        let seen = runner.seen_rules.lock().unwrap();
        assert!(seen.iter().all(|r| r.is_empty()), "empty list delegates rule choice");

        let status = scheduler.status();
        assert!(!status.running);
        assert!(status.total_runs >= 2);
        assert_eq!(status.failed_runs, 0);
        assert!(status.last_run_time.is_some());
    }

    #[tokio::test]
    async fn test_ticks_never_overlap() {
        // Work outlasts the interval; ticks must serialize.
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(30)));
        let scheduler = scheduler_with(runner.clone(), Duration::from_millis(5), &[]);

        scheduler.start(CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.stop().await;

        assert!(runner.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_shot_lifecycle() {
        let runner = Arc::new(CountingRunner::new(Duration::ZERO));
        let scheduler = scheduler_with(runner, Duration::from_millis(10), &[]);
        let ctx = CancellationToken::new();

        scheduler.start(ctx.clone()).unwrap();
        assert_eq!(
            scheduler.start(ctx.clone()).err(),
            Some(SchedulerError::AlreadyRunning)
        );

        scheduler.stop().await;
        assert_eq!(
            scheduler.start(ctx).err(),
            Some(SchedulerError::AlreadyStopped)
        );
        assert!(!scheduler.status().running);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let runner = Arc::new(CountingRunner::new(Duration::ZERO));
        let scheduler = scheduler_with(runner, Duration::from_millis(10), &[]);

        scheduler.start(CancellationToken::new()).unwrap();
        scheduler.stop().await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_before_start_prevents_start() {
        let runner = Arc::new(CountingRunner::new(Duration::ZERO));
        let scheduler = scheduler_with(runner, Duration::from_millis(10), &[]);

        scheduler.stop().await;
        assert_eq!(
            scheduler.start(CancellationToken::new()).err(),
            Some(SchedulerError::AlreadyStopped)
        );
    }

    #[tokio::test]
    async fn test_context_cancellation_stops_loop() {
        let runner = Arc::new(CountingRunner::new(Duration::ZERO));
        let scheduler = scheduler_with(runner, Duration::from_millis(10), &[]);
        let ctx = CancellationToken::new();

        scheduler.start(ctx.clone()).unwrap();
        ctx.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scheduler.status().running);
    }

    #[tokio::test]
    async fn test_failing_rule_does_not_starve_others() {
        let runner = Arc::new(CountingRunner::failing_on("bad"));
        let scheduler =
            scheduler_with(runner.clone(), Duration::from_millis(10), &["bad", "good"]);

        scheduler.start(CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.stop().await;

        let seen = runner.seen_rules.lock().unwrap();
        assert!(seen.iter().any(|r| r == "good"), "good rule ran despite bad");

        let status = scheduler.status();
        assert!(status.failed_runs >= 1);
        assert_eq!(status.successful_runs, 0, "a batch with any failure is failed");
        assert!(status.last_error.contains("bad"));
    }
}
