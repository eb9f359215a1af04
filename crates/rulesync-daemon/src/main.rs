//! rulesync daemon - background synchronization service
//!
//! Loads the configuration, wires the sync service to the local
//! storage factory and the SQLite history store, and drives the
//! configured rules on their intervals until SIGINT/SIGTERM.
//!
//! Rules sharing an effective interval share one scheduler, so ticks
//! for the same period stay serialized; distinct intervals get their
//! own scheduler instance.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rulesync_core::config::{parse_duration, Config};
use rulesync_history::{HistoryPool, SqliteHistoryStore};
use rulesync_storage::{ChecksumAlgorithm, ChecksumOptions, LocalAdapterFactory};
use rulesync_sync::progress::{format_bytes, CallbackReporter, Reporter, UpdateKind};
use rulesync_sync::scheduler::{IntervalScheduler, SchedulerConfig};
use rulesync_sync::service::SyncService;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = resolve_config_path();

    let config = Arc::new(
        Config::load(&config_path)
            .with_context(|| format!("loading configuration from {}", config_path.display()))?,
    );

    init_tracing(&config);
    info!(config = %config_path.display(), "rulesync daemon starting");

    let shutdown = CancellationToken::new();
    install_signal_handlers(shutdown.clone());

    let db_path = config.settings.data_dir.join("history.db");
    let pool = HistoryPool::new(&db_path)
        .await
        .context("opening history database")?;
    let history = Arc::new(SqliteHistoryStore::new(pool));

    let algorithm = ChecksumAlgorithm::parse(&config.settings.checksum_algorithm)
        .with_context(|| {
            format!(
                "unknown checksum algorithm: {}",
                config.settings.checksum_algorithm
            )
        })?;
    let checksum_options = ChecksumOptions {
        max_size: config.settings.checksum_max_size,
        ..Default::default()
    };
    let factory = Arc::new(LocalAdapterFactory::new(algorithm, checksum_options));

    let service = Arc::new(
        SyncService::new(config.clone(), vec![factory], history)?
            .with_reporter(log_reporter()),
    );

    let schedulers = build_schedulers(&config, service.clone())?;
    if schedulers.is_empty() {
        bail!("no schedulable rules; enable the scheduler or add rule schedules");
    }
    for scheduler in &schedulers {
        scheduler.start(shutdown.clone())?;
    }
    info!(schedulers = schedulers.len(), "daemon running");

    shutdown.cancelled().await;
    info!("shutdown requested");

    for scheduler in &schedulers {
        scheduler.stop().await;
        let status = scheduler.status();
        info!(
            total_runs = status.total_runs,
            successful = status.successful_runs,
            failed = status.failed_runs,
            "scheduler drained"
        );
    }
    service.close().await;

    info!("rulesync daemon stopped");
    Ok(())
}

/// Config path: first CLI argument, else the user config directory
fn resolve_config_path() -> PathBuf {
    if let Some(arg) = std::env::args().nth(1) {
        return PathBuf::from(arg);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rulesync")
        .join("config.yaml")
}

/// Progress reporter that forwards transfer milestones to the log
fn log_reporter() -> Arc<dyn Reporter> {
    Arc::new(CallbackReporter::new(Arc::new(|update| match update.kind {
        UpdateKind::Complete => {
            tracing::debug!(
                file = %update.current_file,
                size = %format_bytes(update.current_total),
                done = update.files_completed,
                total = update.files_total,
                "file synced"
            );
        }
        UpdateKind::Error => {
            warn!(
                file = %update.current_file,
                error = update.error.as_deref().unwrap_or("unknown"),
                "transfer failed"
            );
        }
        _ => {}
    })))
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Groups schedulable rules by effective interval
///
/// A rule schedules when the global scheduler is enabled or it carries
/// its own enabled schedule; per-rule intervals override the global
/// one.
fn build_schedulers(
    config: &Arc<Config>,
    service: Arc<SyncService>,
) -> Result<Vec<IntervalScheduler>> {
    let global_interval = parse_duration(&config.scheduler.interval)?;

    let mut by_interval: BTreeMap<Duration, Vec<String>> = BTreeMap::new();
    for entry in config.enabled_rules() {
        let interval = match &entry.schedule {
            Some(schedule) if schedule.enabled => parse_duration(&schedule.interval)?,
            Some(_) => continue,
            None if config.scheduler.enabled => global_interval,
            None => continue,
        };
        by_interval
            .entry(interval)
            .or_default()
            .push(entry.rule.name.clone());
    }

    let mut schedulers = Vec::new();
    for (interval, rules) in by_interval {
        info!(
            interval_secs = interval.as_secs(),
            rules = rules.join(", "),
            "scheduling rules"
        );
        schedulers.push(IntervalScheduler::new(
            SchedulerConfig { interval, rules },
            service.clone(),
        )?);
    }
    Ok(schedulers)
}

fn install_signal_handlers(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                result = ctrl_c => {
                    if let Err(e) = result {
                        warn!(error = %e, "ctrl-c handler failed");
                    }
                    info!("received SIGINT");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                warn!(error = %e, "ctrl-c handler failed");
            }
            info!("received interrupt");
        }

        shutdown.cancel();
    });
}
