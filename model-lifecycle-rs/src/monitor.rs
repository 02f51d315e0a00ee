// model-lifecycle-rs/src/monitor.rs
// Background monitor loop.
//
// Implementation notes:
// - One tokio task per started monitor. Shutdown is a watch channel raced
//   against the inter-iteration sleep; `stop()` awaits the task.
// - Iteration errors are logged and retried after `retry_interval`; the loop
//   only exits on shutdown.
// - Dispatch goes through the executor and never waits on a job.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::analyzer::{PerformanceAnalyzer, PerformanceReport};
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::executor::RetrainingExecutor;
use crate::ledger::LifecycleLedger;
use crate::model::TriggerReason;
use crate::registry::ModelCatalog;
use crate::scheduler::{RetrainingScheduler, ScheduleEntry};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub model_types: Vec<String>,
    pub poll_interval: Duration,
    pub retry_interval: Duration,
    pub confidence_threshold: f64,
    pub issue_count_threshold: usize,
}

impl From<&LifecycleConfig> for MonitorSettings {
    fn from(cfg: &LifecycleConfig) -> Self {
        Self {
            model_types: cfg.model_types.clone(),
            poll_interval: cfg.poll_interval,
            retry_interval: cfg.retry_interval,
            confidence_threshold: cfg.confidence_threshold,
            issue_count_threshold: cfg.issue_count_threshold,
        }
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub schedules_due: usize,
    pub schedules_deferred: usize,
    pub model_types_analyzed: usize,
    pub jobs_dispatched: usize,
    pub failures: usize,
}

/// Shared handles the loop works with.
pub struct MonitorContext {
    pub settings: MonitorSettings,
    pub analyzer: Arc<PerformanceAnalyzer>,
    pub scheduler: RetrainingScheduler,
    pub executor: RetrainingExecutor,
    pub ledger: Arc<LifecycleLedger>,
    pub catalog: Arc<ModelCatalog>,
}

impl MonitorContext {
    /// Configured model types plus those in the catalog and in schedules.
    pub async fn known_model_types(&self) -> Vec<String> {
        let mut types = self.settings.model_types.clone();
        types.extend(self.catalog.model_types());
        types.extend(self.scheduler.model_types().await);
        types.sort();
        types.dedup();
        types
    }

    /// Run one monitor pass at `now`.
    ///
    /// Each due schedule and each model type is handled on its own: a
    /// failure is logged and the pass moves on. The first error is returned
    /// once everything has been tried.
    #[instrument(name = "monitor_iteration", skip_all)]
    pub async fn run_iteration(&self, now: DateTime<Utc>) -> Result<IterationSummary> {
        let mut summary = IterationSummary::default();
        let mut first_error: Option<LifecycleError> = None;

        for entry in self.scheduler.next_due(now).await {
            summary.schedules_due += 1;
            match self.dispatch_schedule(&entry, now).await {
                Ok(true) => summary.jobs_dispatched += 1,
                Ok(false) => {
                    if entry.is_conditional() {
                        summary.schedules_deferred += 1;
                    }
                }
                Err(err) => {
                    tracing::error!(
                        schedule_id = %entry.id,
                        model_type = %entry.model_type,
                        error = %err,
                        "due schedule failed"
                    );
                    summary.failures += 1;
                    first_error.get_or_insert(err);
                }
            }
        }

        for model_type in self.known_model_types().await {
            let report = match self.analyzer.try_analyze(&model_type, None).await {
                Ok(report) => report,
                Err(err) => {
                    tracing::error!(model_type = %model_type, error = %err, "analysis failed");
                    metrics::increment_counter!(
                        "model_lifecycle_analysis_errors_total",
                        "model_type" => model_type.clone()
                    );
                    summary.failures += 1;
                    first_error.get_or_insert(err.into());
                    continue;
                }
            };
            summary.model_types_analyzed += 1;

            let Some(reason) = self.retraining_reason(&report) else {
                continue;
            };
            tracing::info!(
                model_type = %model_type,
                reason = %reason,
                confidence = report.confidence_score,
                issues = report.common_issues.len(),
                "analysis calls for retraining"
            );
            self.ledger.record_analysis(report);
            if self.executor.trigger(&model_type, reason) {
                summary.jobs_dispatched += 1;
            }
        }

        match first_error {
            Some(err) => {
                tracing::warn!(?summary, "monitor iteration finished with failures");
                Err(err)
            }
            None => Ok(summary),
        }
    }

    /// Dispatch (or defer) one due schedule. Returns whether a job started.
    async fn dispatch_schedule(&self, entry: &ScheduleEntry, now: DateTime<Utc>) -> Result<bool> {
        if entry.is_conditional() {
            let report = self.analyzer.try_analyze(&entry.model_type, None).await?;
            let met = report.total_feedback >= entry.conditions.min_feedback_count
                && report.confidence_score < entry.conditions.performance_threshold;
            if !met {
                let deferred = self.scheduler.defer(&entry.id, now).await?;
                tracing::debug!(
                    schedule_id = %entry.id,
                    model_type = %entry.model_type,
                    next_run = %deferred.next_run,
                    "schedule conditions not met; deferred"
                );
                return Ok(false);
            }
        }

        let started = self.executor.trigger(&entry.model_type, TriggerReason::Scheduled);
        let advanced = self.scheduler.advance(&entry.id, now).await?;
        tracing::info!(
            schedule_id = %entry.id,
            model_type = %entry.model_type,
            started,
            next_run = %advanced.next_run,
            "scheduled retraining dispatched"
        );
        self.ledger.record_schedule(advanced);
        Ok(started)
    }

    fn retraining_reason(&self, report: &PerformanceReport) -> Option<TriggerReason> {
        // Nothing to learn from yet.
        if report.total_feedback == 0 {
            return None;
        }
        if report.confidence_score < self.settings.confidence_threshold {
            Some(TriggerReason::PerformanceBased)
        } else if report.common_issues.len() > self.settings.issue_count_threshold {
            Some(TriggerReason::IssueBased)
        } else {
            None
        }
    }
}

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Start/stop wrapper around the monitor loop.
pub struct BackgroundMonitor {
    ctx: Arc<MonitorContext>,
    task: Mutex<Option<MonitorTask>>,
}

impl BackgroundMonitor {
    pub fn new(ctx: Arc<MonitorContext>) -> Self {
        Self {
            ctx,
            task: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<MonitorContext> {
        &self.ctx
    }

    /// Spawn the loop. Returns false if it was already running.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.ctx), rx));
        *task = Some(MonitorTask { shutdown, handle });

        tracing::info!(
            poll_interval_secs = self.ctx.settings.poll_interval.as_secs(),
            "background monitor started"
        );
        true
    }

    /// Signal the loop and wait for it to finish its current iteration.
    pub async fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(task) = task else {
            return;
        };

        let _ = task.shutdown.send(true);
        if let Err(err) = task.handle.await {
            tracing::error!(error = %err, "background monitor task ended abnormally");
        }
        tracing::info!("background monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

async fn run_loop(ctx: Arc<MonitorContext>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let delay = match ctx.run_iteration(Utc::now()).await {
            Ok(summary) => {
                tracing::debug!(?summary, "monitor iteration complete");
                ctx.settings.poll_interval
            }
            Err(err) => {
                tracing::error!(error = %err, "monitor iteration failed; retrying sooner");
                metrics::increment_counter!("model_lifecycle_monitor_errors_total");
                ctx.settings.retry_interval
            }
        };

        // Only `true` is ever sent, and a dropped sender also means stop.
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
}
