// model-lifecycle-rs/src/orchestrator.rs
// Public facade over analysis, scheduling, retraining and promotion.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::analyzer::{PerformanceAnalyzer, PerformanceReport};
use crate::backend::{HttpTrainingBackend, TrainingBackend};
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::executor::{
    ActiveJob, DataPreparer, ExecutorDeps, ExecutorSettings, RatingLabelPreparer, RetrainingExecutor,
    RetrainingJob,
};
use crate::feedback::{FeedbackStore, FileBackedFeedbackStore, TimeRange};
use crate::ledger::LifecycleLedger;
use crate::model::{ModelRecord, TriggerReason};
use crate::monitor::{BackgroundMonitor, MonitorContext, MonitorSettings};
use crate::promotion::{cleanup_unpromoted, PromotionPolicy};
use crate::registry::{ArtifactStore, FileArtifactStore, ModelCatalog};
use crate::scheduler::{RetrainingScheduler, ScheduleEntry, ScheduleKind, TriggerConditions};

const RECENT_ANALYSES: usize = 10;

/// Snapshot returned by [`LifecycleOrchestrator::get_status`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleStatus {
    pub is_running: bool,
    pub active_jobs: Vec<ActiveJob>,
    pub retraining_history: Vec<RetrainingJob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub record: ModelRecord,
    pub retraining_count: usize,
    pub last_retraining: Option<DateTime<Utc>>,
    pub last_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub generated_at: DateTime<Utc>,
    pub total_feedback: usize,
    pub average_rating: f64,
    pub confidence_score: f64,
}

impl From<&PerformanceReport> for AnalysisSummary {
    fn from(report: &PerformanceReport) -> Self {
        Self {
            generated_at: report.generated_at,
            total_feedback: report.total_feedback,
            average_rating: report.average_rating,
            confidence_score: report.confidence_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub model_type: String,
    pub current_performance: PerformanceReport,
    pub schedules: Vec<ScheduleEntry>,
    pub last_analysis: Option<DateTime<Utc>>,
    /// Newest first.
    pub recent_analyses: Vec<AnalysisSummary>,
}

/// External collaborators.
pub struct Collaborators {
    pub feedback: Arc<dyn FeedbackStore + Send + Sync>,
    pub backend: Arc<dyn TrainingBackend + Send + Sync>,
    pub artifacts: Arc<dyn ArtifactStore + Send + Sync>,
    pub preparer: Arc<dyn DataPreparer + Send + Sync>,
}

impl Collaborators {
    /// Collaborators with the rating-label data preparer.
    pub fn new(
        feedback: Arc<dyn FeedbackStore + Send + Sync>,
        backend: Arc<dyn TrainingBackend + Send + Sync>,
        artifacts: Arc<dyn ArtifactStore + Send + Sync>,
    ) -> Self {
        Self {
            feedback,
            backend,
            artifacts,
            preparer: Arc::new(RatingLabelPreparer),
        }
    }

    pub fn with_preparer(mut self, preparer: Arc<dyn DataPreparer + Send + Sync>) -> Self {
        self.preparer = preparer;
        self
    }
}

/// Model lifecycle orchestrator.
///
/// Typical usage (inside a tokio runtime):
///
/// ```ignore
/// let orchestrator = LifecycleOrchestrator::from_config(LifecycleConfig::from_env()).await?;
/// orchestrator.start();
/// // ... serve ...
/// orchestrator.stop().await;
/// ```
pub struct LifecycleOrchestrator {
    config: LifecycleConfig,
    artifacts: Arc<dyn ArtifactStore + Send + Sync>,
    catalog: Arc<ModelCatalog>,
    ledger: Arc<LifecycleLedger>,
    analyzer: Arc<PerformanceAnalyzer>,
    scheduler: RetrainingScheduler,
    executor: RetrainingExecutor,
    monitor: BackgroundMonitor,
}

impl LifecycleOrchestrator {
    pub fn new(config: LifecycleConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            feedback,
            backend,
            artifacts,
            preparer,
        } = collaborators;

        let catalog = Arc::new(ModelCatalog::with_model_types(&config.model_types));
        let mut ledger = LifecycleLedger::new(config.ledger_capacity);
        if let Some(path) = &config.ledger_journal {
            ledger = ledger.with_journal(path);
        }
        let ledger = Arc::new(ledger);

        let analyzer = Arc::new(PerformanceAnalyzer::new(
            Arc::clone(&feedback),
            config.analysis_window_days,
        ));
        let scheduler = RetrainingScheduler::new();
        let executor = RetrainingExecutor::new(
            ExecutorSettings::from(&config),
            PromotionPolicy::new(config.promotion_threshold),
            ExecutorDeps {
                feedback,
                backend,
                artifacts: Arc::clone(&artifacts),
                preparer,
                catalog: Arc::clone(&catalog),
                ledger: Arc::clone(&ledger),
            },
        );

        let monitor = BackgroundMonitor::new(Arc::new(MonitorContext {
            settings: MonitorSettings::from(&config),
            analyzer: Arc::clone(&analyzer),
            scheduler: scheduler.clone(),
            executor: executor.clone(),
            ledger: Arc::clone(&ledger),
            catalog: Arc::clone(&catalog),
        }));

        Self {
            config,
            artifacts,
            catalog,
            ledger,
            analyzer,
            scheduler,
            executor,
            monitor,
        }
    }

    /// Build with the file-backed stores and the HTTP training backend, and
    /// restore the live versions recorded in the artifact store.
    pub async fn from_config(config: LifecycleConfig) -> Result<Self> {
        let feedback = Arc::new(FileBackedFeedbackStore::new(&config.feedback_path)?);
        let artifacts = Arc::new(FileArtifactStore::new(&config.artifact_root)?);
        let backend = Arc::new(HttpTrainingBackend::new(
            config.backend_url.clone(),
            config.backend_timeout,
        )?);

        let orchestrator = Self::new(config, Collaborators::new(feedback, backend, artifacts));
        orchestrator.restore_catalog().await?;
        Ok(orchestrator)
    }

    /// Point each known model type at its most recently promoted stored
    /// version, with that version's metrics. Returns how many were restored.
    pub async fn restore_catalog(&self) -> Result<usize> {
        let mut model_types = self.config.model_types.clone();
        model_types.extend(self.catalog.model_types());
        model_types.sort();
        model_types.dedup();

        let mut restored = 0;
        for model_type in &model_types {
            let stored = self.artifacts.load_metadata(model_type).await?;
            if let Some(version) = self.catalog.restore(&stored) {
                tracing::info!(model_type = %model_type, version = %version, "restored live model version");
                restored += 1;
            }
        }
        Ok(restored)
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &LifecycleLedger {
        &self.ledger
    }

    /// Start the background monitor; false if it was already running.
    pub fn start(&self) -> bool {
        self.monitor.start()
    }

    pub async fn stop(&self) {
        self.monitor.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_running()
    }

    /// Register `config.default_schedule` for every configured model type.
    pub async fn install_default_schedules(&self) -> Result<Vec<String>> {
        let Some(kind) = self.config.default_schedule else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::with_capacity(self.config.model_types.len());
        for model_type in &self.config.model_types {
            ids.push(
                self.schedule_retraining(model_type, kind, TriggerConditions::default())
                    .await?,
            );
        }
        Ok(ids)
    }

    /// Never fails; unknown model types yield empty fields.
    pub fn get_status(&self, model_type: Option<&str>) -> LifecycleStatus {
        let retraining_history = match model_type {
            Some(mt) => self.ledger.retraining_history(mt),
            None => {
                let mut all: Vec<RetrainingJob> = self
                    .ledger
                    .model_types()
                    .iter()
                    .flat_map(|mt| self.ledger.retraining_history(mt))
                    .collect();
                all.sort_by_key(|j| j.started_at);
                all
            }
        };

        LifecycleStatus {
            is_running: self.monitor.is_running(),
            active_jobs: self.executor.active_jobs(model_type),
            retraining_history,
        }
    }

    /// Start a retraining job; false when one is already running.
    #[instrument(skip_all, fields(model_type = %model_type, reason = %reason))]
    pub fn trigger_retraining(&self, model_type: &str, reason: TriggerReason) -> bool {
        self.executor.trigger(model_type, reason)
    }

    /// Like `trigger_retraining`, returning the job handle for callers that
    /// want to await the outcome.
    pub fn dispatch_retraining(
        &self,
        model_type: &str,
        reason: TriggerReason,
    ) -> Option<JoinHandle<RetrainingJob>> {
        self.executor.dispatch(model_type, reason)
    }

    #[instrument(skip_all, fields(model_type = %model_type, kind = %kind))]
    pub async fn schedule_retraining(
        &self,
        model_type: &str,
        kind: ScheduleKind,
        conditions: TriggerConditions,
    ) -> Result<String> {
        let id = self
            .scheduler
            .schedule(model_type, kind, conditions, Utc::now())
            .await?;
        if let Some(entry) = self.scheduler.get(&id).await {
            self.ledger.record_schedule(entry);
        }
        Ok(id)
    }

    pub async fn pause_schedule(&self, schedule_id: &str) -> bool {
        let paused = self.scheduler.pause(schedule_id).await;
        if paused {
            if let Some(entry) = self.scheduler.get(schedule_id).await {
                self.ledger.record_schedule(entry);
            }
        }
        paused
    }

    pub async fn list_schedules(&self, model_type: Option<&str>) -> Vec<ScheduleEntry> {
        self.scheduler.list(model_type).await
    }

    /// Analyze and record the report in the ledger.
    pub async fn analyze_performance(
        &self,
        model_type: &str,
        window: Option<TimeRange>,
    ) -> PerformanceReport {
        let report = self.analyzer.analyze(model_type, window).await;
        self.ledger.record_analysis(report.clone());
        report
    }

    pub fn model_info(&self, model_type: &str) -> Option<ModelInfo> {
        let record = self.catalog.get(model_type)?;
        let history = self.ledger.retraining_history(model_type);
        let last = history.last();

        Some(ModelInfo {
            retraining_count: history.len(),
            last_retraining: last.map(|j| j.finished_at.unwrap_or(j.started_at)),
            last_version: history.iter().rev().find_map(|j| j.version.clone()),
            record,
        })
    }

    pub async fn optimization_status(&self, model_type: &str) -> OptimizationStatus {
        let analyses = self.ledger.analyses(model_type);
        let recent_analyses: Vec<AnalysisSummary> = analyses
            .iter()
            .rev()
            .take(RECENT_ANALYSES)
            .map(AnalysisSummary::from)
            .collect();

        OptimizationStatus {
            model_type: model_type.to_string(),
            current_performance: self.analyzer.analyze(model_type, None).await,
            schedules: self.scheduler.list(Some(model_type)).await,
            last_analysis: analyses.last().map(|r| r.generated_at),
            recent_analyses,
        }
    }

    /// Write the prepared training samples for `model_type` to `path` as
    /// NDJSON. Returns the number of samples written.
    #[instrument(skip_all, fields(model_type = %model_type, path = %path.as_ref().display()))]
    pub async fn export_training_data(&self, model_type: &str, path: impl AsRef<Path>) -> Result<usize> {
        let samples = self.executor.collect_samples(model_type).await?;
        if samples.is_empty() {
            return Err(LifecycleError::NoTrainingData {
                model_type: model_type.to_string(),
            });
        }

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut buf = Vec::new();
        for sample in &samples {
            serde_json::to_writer(&mut buf, sample)?;
            buf.push(b'\n');
        }
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(&buf).await?;
        file.flush().await?;

        tracing::info!(samples = samples.len(), "training data exported");
        Ok(samples.len())
    }

    /// Remove stale unpromoted artifacts across all known model types.
    pub async fn cleanup_unpromoted_artifacts(&self, retention_days: Option<i64>) -> Result<usize> {
        let retention_days = retention_days.unwrap_or(self.config.artifact_retention_days);
        let mut model_types = self.monitor.context().known_model_types().await;
        model_types.extend(self.ledger.model_types());
        model_types.sort();
        model_types.dedup();

        Ok(cleanup_unpromoted(
            &self.catalog,
            self.artifacts.as_ref(),
            &model_types,
            retention_days,
            Utc::now(),
        )
        .await?)
    }
}
