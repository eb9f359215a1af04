//! Sync run coordination
//!
//! [`SyncService`] resolves rules to adapters through registered
//! factories, guards each run with the cross-process lock, drives the
//! executor, and records the outcome in the history store. It also
//! implements [`SyncRunner`], which is how the scheduler reaches it.
//!
//! Adapter instances are cached per endpoint behind a reader/writer
//! lock and reused across plan and execute within one run; they are
//! closed when the service shuts down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use rulesync_core::config::{parse_duration, Config};
use rulesync_core::domain::{ConfigError, SyncError, SyncPlan, SyncRule};
use rulesync_core::ports::{
    ExecutionRecord, ExecutionStatus, IAdapterFactory, IHistoryStore, IStorageAdapter,
};

use crate::executor::{ExecutionSummary, RuleExecutor};
use crate::lock::{FileLock, LockError};
use crate::progress::{NullReporter, Reporter};
use crate::scheduler::SyncRunner;

/// Orchestrates complete sync runs for configured rules
pub struct SyncService {
    config: Arc<Config>,
    factories: Vec<Arc<dyn IAdapterFactory>>,
    adapters: RwLock<HashMap<String, Arc<dyn IStorageAdapter>>>,
    executor: RuleExecutor,
    /// Behind a std mutex: only ever locked from the blocking pool
    lock: Arc<Mutex<FileLock>>,
    history: Arc<dyn IHistoryStore>,
    reporter: Arc<dyn Reporter>,
}

impl SyncService {
    /// Builds a service from validated configuration
    pub fn new(
        config: Arc<Config>,
        factories: Vec<Arc<dyn IAdapterFactory>>,
        history: Arc<dyn IHistoryStore>,
    ) -> anyhow::Result<Self> {
        let mut lock = FileLock::new(&config.lock_dir()).context("creating file lock")?;
        if let Ok(timeout) = parse_duration(&config.settings.stale_lock_timeout) {
            lock.set_stale_timeout(timeout);
        }

        Ok(Self {
            config,
            factories,
            adapters: RwLock::new(HashMap::new()),
            executor: RuleExecutor::new(),
            lock: Arc::new(Mutex::new(lock)),
            history,
            reporter: Arc::new(NullReporter),
        })
    }

    /// Replaces the progress reporter (defaults to a no-op)
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Resolves an endpoint name to a (cached) adapter
    async fn adapter_for(&self, endpoint_name: &str) -> Result<Arc<dyn IStorageAdapter>, SyncError> {
        {
            let cache = self.adapters.read().await;
            if let Some(adapter) = cache.get(endpoint_name) {
                return Ok(adapter.clone());
            }
        }

        let endpoint = self.config.endpoint(endpoint_name)?;
        let transport = self.config.transport(&endpoint.transport)?;
        let factory = self
            .factories
            .iter()
            .find(|f| f.supports(transport))
            .ok_or_else(|| {
                SyncError::Config(ConfigError::TransportNotFound(transport.name.clone()))
            })?;

        let adapter = factory.create(transport, &endpoint.root)?;

        let mut cache = self.adapters.write().await;
        // Another task may have won the race; keep the first instance.
        let adapter = cache
            .entry(endpoint_name.to_string())
            .or_insert(adapter)
            .clone();
        Ok(adapter)
    }

    /// Builds a plan for a rule without executing it (dry run)
    pub async fn plan_sync(
        &self,
        ctx: &CancellationToken,
        rule_name: &str,
    ) -> Result<SyncPlan, SyncError> {
        let rule = self.config.rule(rule_name)?.rule.clone();
        let source = self.adapter_for(&rule.source_endpoint).await?;
        let target = self.adapter_for(&rule.target_endpoint).await?;
        self.executor
            .plan(ctx, &rule, source.as_ref(), target.as_ref())
            .await
    }

    /// Executes a previously built plan
    pub async fn execute_sync(
        &self,
        ctx: &CancellationToken,
        plan: &SyncPlan,
    ) -> Result<ExecutionSummary, SyncError> {
        let rule = self.config.rule(&plan.rule_name)?.rule.clone();
        let source = self.adapter_for(&rule.source_endpoint).await?;
        let target = self.adapter_for(&rule.target_endpoint).await?;

        let mut summary = ExecutionSummary::default();
        self.executor
            .execute(ctx, plan, &source, &target, &self.reporter, &mut summary)
            .await?;
        Ok(summary)
    }

    /// Runs one rule end to end: lock, plan, execute, record
    ///
    /// The lock is released on every path; a failed release is logged
    /// but never masks the run's own outcome.
    #[instrument(skip_all, fields(rule = %rule.name))]
    pub async fn run_rule(
        &self,
        ctx: &CancellationToken,
        rule: &SyncRule,
    ) -> anyhow::Result<ExecutionRecord> {
        let start_time = Utc::now();

        // Lock-file access is synchronous std::fs plus the liveness
        // probe; run it on the blocking pool so a slow lock directory
        // never stalls the async workers.
        {
            let lock = self.lock.clone();
            let rule_name = rule.name.clone();
            let acquired = tokio::task::spawn_blocking(move || {
                let mut lock = lock.lock().expect("sync lock poisoned");
                lock.acquire(&rule_name)
            })
            .await
            .context("sync lock task panicked")?;

            match acquired {
                Ok(()) => {}
                Err(LockError::Busy { holder }) => {
                    return Err(SyncError::InProgress {
                        holder: holder.to_string(),
                    }
                    .into());
                }
                Err(e) => return Err(anyhow::Error::new(e).context("acquiring sync lock")),
            }
        }

        let outcome = self.run_rule_locked(ctx, rule).await;

        {
            let lock = self.lock.clone();
            let released = tokio::task::spawn_blocking(move || {
                let mut lock = lock.lock().expect("sync lock poisoned");
                lock.release()
            })
            .await;

            match released {
                Ok(Ok(())) => {}
                Ok(Err(LockError::Stolen)) => {
                    // Operator territory; report loudly, recover nothing.
                    error!(rule = %rule.name, "sync lock was stolen during the run");
                }
                Ok(Err(e)) => {
                    warn!(rule = %rule.name, error = %e, "failed to release sync lock");
                }
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "sync lock release task panicked");
                }
            }
        }

        let (summary, result) = outcome;
        let (status, error_text) = match &result {
            Ok(()) => (ExecutionStatus::Success, String::new()),
            Err(e) if summary.any_progress() => (ExecutionStatus::Partial, e.to_string()),
            Err(e) => (ExecutionStatus::Failed, e.to_string()),
        };

        let record = ExecutionRecord {
            id: 0,
            rule_name: rule.name.clone(),
            start_time,
            end_time: Utc::now(),
            status,
            files_synced: summary.files_copied,
            bytes_synced: summary.bytes_copied,
            error: error_text,
        };

        if let Err(e) = self.history.save(&record).await {
            warn!(rule = %rule.name, error = %e, "failed to persist execution record");
        }

        match result {
            Ok(()) => {
                info!(
                    files = summary.files_copied,
                    bytes = summary.bytes_copied,
                    "rule synced"
                );
                Ok(record)
            }
            Err(e) => Err(anyhow::Error::new(e).context(format!("rule {}", rule.name))),
        }
    }

    async fn run_rule_locked(
        &self,
        ctx: &CancellationToken,
        rule: &SyncRule,
    ) -> (ExecutionSummary, Result<(), SyncError>) {
        let mut summary = ExecutionSummary::default();

        let plan = match async {
            let source = self.adapter_for(&rule.source_endpoint).await?;
            let target = self.adapter_for(&rule.target_endpoint).await?;
            let plan = self
                .executor
                .plan(ctx, rule, source.as_ref(), target.as_ref())
                .await?;
            Ok::<_, SyncError>((plan, source, target))
        }
        .await
        {
            Ok(parts) => parts,
            Err(e) => return (summary, Err(e)),
        };
        let (plan, source, target) = plan;

        let result = self
            .executor
            .execute(ctx, &plan, &source, &target, &self.reporter, &mut summary)
            .await;
        (summary, result)
    }

    /// Closes every cached adapter; called once at shutdown
    pub async fn close(&self) {
        let adapters = {
            let mut cache = self.adapters.write().await;
            std::mem::take(&mut *cache)
        };
        for (endpoint, adapter) in adapters {
            if let Err(e) = adapter.close().await {
                warn!(endpoint = %endpoint, error = %e, "failed to close adapter");
            }
        }
    }
}

#[async_trait::async_trait]
impl SyncRunner for SyncService {
    /// Runs one named rule, or every enabled rule when the name is
    /// empty; per-rule failures are aggregated, not short-circuited
    async fn run_sync(&self, ctx: &CancellationToken, rule_name: &str) -> anyhow::Result<()> {
        let rules: Vec<SyncRule> = if rule_name.is_empty() {
            self.config
                .enabled_rules()
                .map(|entry| entry.rule.clone())
                .collect()
        } else {
            vec![self.config.rule(rule_name)?.rule.clone()]
        };

        let mut errors: Vec<anyhow::Error> = Vec::new();
        for rule in &rules {
            if ctx.is_cancelled() {
                errors.push(SyncError::Cancelled.into());
                break;
            }
            if let Err(e) = self.run_rule(ctx, rule).await {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            let summary = errors
                .iter()
                .map(|e| format!("{e:#}"))
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("sync completed with {} error(s): {summary}", errors.len())
        }
    }
}
