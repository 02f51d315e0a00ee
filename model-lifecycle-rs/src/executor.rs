// model-lifecycle-rs/src/executor.rs
// Retraining job execution.
//
// Implementation notes:
// - At most one job runs per model type. The running-set check and insert
//   happen under one mutex; a drop guard removes the entry when the job task
//   ends, including when the job body panics.
// - Each job runs in its own task and always ends in a ledger entry. Nothing
//   a job does propagates to the caller.
// - Every training backend call is bounded by `backend_timeout`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::{BackendError, TrainingBackend, TrainingRequest};
use crate::config::LifecycleConfig;
use crate::evaluation::{evaluate, train_validation_split};
use crate::feedback::{FeedbackStore, FeedbackStoreError, TimeRange};
use crate::ledger::LifecycleLedger;
use crate::model::{FeedbackRecord, ModelMetrics, TrainingSample, TriggerReason};
use crate::promotion::PromotionPolicy;
use crate::registry::{ArtifactStore, ModelCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobFailure {
    #[error("insufficient training data: {available} available, {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("feedback store failure: {message}")]
    FeedbackStore { message: String },

    #[error("training backend failure: {message}")]
    BackendFailure { message: String },

    #[error("{step} timed out after {timeout_ms}ms")]
    Timeout { step: String, timeout_ms: u64 },

    #[error("evaluation failure: {message}")]
    Evaluation { message: String },

    #[error("artifact store failure: {message}")]
    ArtifactStore { message: String },

    #[error("job panicked: {message}")]
    Panicked { message: String },
}

/// One retraining run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainingJob {
    pub id: String,
    pub model_type: String,
    pub reason: TriggerReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub failure: Option<JobFailure>,
    pub training_samples: usize,
    pub before_metrics: Option<ModelMetrics>,
    pub after_metrics: Option<ModelMetrics>,
    pub accuracy_improvement: Option<f64>,
    /// Version the job produced.
    pub version: Option<String>,
    /// Live version replaced by this job, set only when promoted.
    pub previous_version: Option<String>,
    pub promoted: bool,
}

impl RetrainingJob {
    fn start(model_type: &str, reason: TriggerReason) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model_type: model_type.to_string(),
            reason,
            started_at: Utc::now(),
            finished_at: None,
            status: JobStatus::Running,
            failure: None,
            training_samples: 0,
            before_metrics: None,
            after_metrics: None,
            accuracy_improvement: None,
            version: None,
            previous_version: None,
            promoted: false,
        }
    }

    fn finish(&mut self, outcome: Result<(), JobFailure>) {
        self.finished_at = Some(Utc::now());
        match outcome {
            Ok(()) => self.status = JobStatus::Succeeded,
            Err(failure) => {
                self.status = JobStatus::Failed;
                self.failure = Some(failure);
            }
        }
    }
}

/// A job currently holding its model type's slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveJob {
    pub job_id: String,
    pub model_type: String,
    pub reason: TriggerReason,
    pub started_at: DateTime<Utc>,
}

/// Turns raw feedback into training samples.
pub trait DataPreparer {
    fn prepare(&self, records: &[FeedbackRecord]) -> Vec<TrainingSample>;
}

/// Uses rated records that carry the message text: the text is the input,
/// the star rating is the label and `rating / 5` the weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct RatingLabelPreparer;

impl DataPreparer for RatingLabelPreparer {
    fn prepare(&self, records: &[FeedbackRecord]) -> Vec<TrainingSample> {
        records
            .iter()
            .filter_map(|r| {
                let rating = r.valid_rating()?;
                let text = r.message_text.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                Some(TrainingSample {
                    input: text.to_string(),
                    target: rating.to_string(),
                    weight: f64::from(rating) / 5.0,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub training_window_days: i64,
    pub min_training_samples: usize,
    pub validation_fraction: f64,
    pub split_seed: u64,
    pub backend_timeout: Duration,
}

impl From<&LifecycleConfig> for ExecutorSettings {
    fn from(cfg: &LifecycleConfig) -> Self {
        Self {
            training_window_days: cfg.training_window_days,
            min_training_samples: cfg.min_training_samples,
            validation_fraction: cfg.validation_fraction,
            split_seed: cfg.split_seed,
            backend_timeout: cfg.backend_timeout,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&LifecycleConfig::default())
    }
}

/// Collaborators a job needs.
pub struct ExecutorDeps {
    pub feedback: Arc<dyn FeedbackStore + Send + Sync>,
    pub backend: Arc<dyn TrainingBackend + Send + Sync>,
    pub artifacts: Arc<dyn ArtifactStore + Send + Sync>,
    pub preparer: Arc<dyn DataPreparer + Send + Sync>,
    pub catalog: Arc<ModelCatalog>,
    pub ledger: Arc<LifecycleLedger>,
}

#[derive(Clone)]
pub struct RetrainingExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    settings: ExecutorSettings,
    policy: PromotionPolicy,
    deps: ExecutorDeps,
    running: Mutex<HashMap<String, ActiveJob>>,
}

/// Releases a model type's running slot on drop.
struct RunningSlot {
    inner: Arc<ExecutorInner>,
    model_type: String,
    job_id: String,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        let mut running = self.inner.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running
            .get(&self.model_type)
            .is_some_and(|active| active.job_id == self.job_id)
        {
            running.remove(&self.model_type);
        }
    }
}

impl RetrainingExecutor {
    pub fn new(settings: ExecutorSettings, policy: PromotionPolicy, deps: ExecutorDeps) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                settings,
                policy,
                deps,
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start a job unless one is already running for `model_type`.
    ///
    /// Returns false on a concurrency conflict.
    pub fn trigger(&self, model_type: &str, reason: TriggerReason) -> bool {
        self.dispatch(model_type, reason).is_some()
    }

    /// Like [`trigger`](Self::trigger), returning the job's handle.
    pub fn dispatch(&self, model_type: &str, reason: TriggerReason) -> Option<JoinHandle<RetrainingJob>> {
        let job = RetrainingJob::start(model_type, reason);

        {
            let mut running = self.inner.running.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(active) = running.get(model_type) {
                tracing::info!(
                    model_type,
                    reason = %reason,
                    running_job = %active.job_id,
                    "retraining already running; trigger rejected"
                );
                metrics::increment_counter!(
                    "model_lifecycle_triggers_rejected_total",
                    "model_type" => model_type.to_string()
                );
                return None;
            }
            running.insert(
                model_type.to_string(),
                ActiveJob {
                    job_id: job.id.clone(),
                    model_type: job.model_type.clone(),
                    reason,
                    started_at: job.started_at,
                },
            );
        }

        let slot = RunningSlot {
            inner: Arc::clone(&self.inner),
            model_type: model_type.to_string(),
            job_id: job.id.clone(),
        };
        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("retraining_job", job_id = %job.id, model_type, reason = %reason);

        tracing::info!(parent: &span, "retraining job accepted");
        metrics::increment_counter!(
            "model_lifecycle_jobs_started_total",
            "model_type" => model_type.to_string(),
            "reason" => reason.as_str()
        );

        Some(tokio::spawn(
            async move {
                let _slot = slot;
                let body = tokio::spawn(Arc::clone(&inner).run(job.clone()).in_current_span());
                match body.await {
                    Ok(done) => done,
                    Err(err) => {
                        let mut failed = job;
                        failed.finish(Err(JobFailure::Panicked {
                            message: err.to_string(),
                        }));
                        inner.record(failed)
                    }
                }
            }
            .instrument(span),
        ))
    }

    pub fn is_running(&self, model_type: &str) -> bool {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(model_type)
    }

    /// Jobs currently running, optionally for one model type.
    pub fn active_jobs(&self, model_type: Option<&str>) -> Vec<ActiveJob> {
        let running = self.inner.running.lock().unwrap_or_else(PoisonError::into_inner);
        let mut jobs: Vec<ActiveJob> = running
            .values()
            .filter(|j| model_type.map_or(true, |mt| j.model_type == mt))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.started_at);
        jobs
    }

    /// Training samples for `model_type` over the training window.
    pub async fn collect_samples(
        &self,
        model_type: &str,
    ) -> Result<Vec<TrainingSample>, FeedbackStoreError> {
        let records = self.inner.collect_records(model_type).await?;
        Ok(self.inner.deps.preparer.prepare(&records))
    }
}

impl ExecutorInner {
    async fn run(self: Arc<Self>, mut job: RetrainingJob) -> RetrainingJob {
        let outcome = self.execute(&mut job).await;
        job.finish(outcome);
        self.record(job)
    }

    /// Write the terminal job to the ledger and emit the result notification.
    fn record(&self, job: RetrainingJob) -> RetrainingJob {
        let status = match job.status {
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Running => "running",
        };
        metrics::increment_counter!(
            "model_lifecycle_jobs_finished_total",
            "model_type" => job.model_type.clone(),
            "status" => status
        );

        match &job.failure {
            None => tracing::info!(
                job_id = %job.id,
                model_type = %job.model_type,
                version = job.version.as_deref().unwrap_or("-"),
                promoted = job.promoted,
                accuracy_before = job.before_metrics.map(|m| m.accuracy),
                accuracy_after = job.after_metrics.map(|m| m.accuracy),
                accuracy_improvement = job.accuracy_improvement,
                "retraining completed"
            ),
            Some(failure) => tracing::error!(
                job_id = %job.id,
                model_type = %job.model_type,
                failure = %failure,
                "retraining failed"
            ),
        }

        self.deps.ledger.record_retraining(job.clone());
        job
    }

    async fn collect_records(&self, model_type: &str) -> Result<Vec<FeedbackRecord>, FeedbackStoreError> {
        let window = TimeRange::last_days(self.settings.training_window_days, Utc::now());
        let mut records = self.deps.feedback.query(model_type, window).await?;
        records.retain(|r| r.model_type == model_type);
        Ok(records)
    }

    async fn execute(&self, job: &mut RetrainingJob) -> Result<(), JobFailure> {
        let model_type = job.model_type.clone();
        let required = self.settings.min_training_samples;

        // 1. collect
        let records = self
            .collect_records(&model_type)
            .await
            .map_err(|e| JobFailure::FeedbackStore {
                message: e.to_string(),
            })?;
        if records.len() < required {
            return Err(JobFailure::InsufficientData {
                available: records.len(),
                required,
            });
        }

        // 2. prepare
        let samples = self.deps.preparer.prepare(&records);
        job.training_samples = samples.len();
        if samples.len() < required {
            return Err(JobFailure::InsufficientData {
                available: samples.len(),
                required,
            });
        }

        // 3. split and train
        let (train, validation) = train_validation_split(
            &samples,
            self.settings.validation_fraction,
            self.settings.split_seed,
        );
        let inputs: Vec<String> = validation.iter().map(|s| s.input.clone()).collect();
        let targets: Vec<String> = validation.iter().map(|s| s.target.clone()).collect();

        let live = self.deps.catalog.get(&model_type);
        let base_version = live
            .as_ref()
            .map(|r| r.current_production_version.clone())
            .unwrap_or_else(|| "v1".to_string());

        tracing::info!(
            train = train.len(),
            validation = validation.len(),
            base_version = %base_version,
            "invoking training backend"
        );
        let trained = self
            .bounded(
                "train",
                self.deps.backend.train(TrainingRequest {
                    model_type: model_type.clone(),
                    base_version: base_version.clone(),
                    train,
                    validation_inputs: inputs.clone(),
                    seed: self.settings.split_seed,
                }),
            )
            .await?;

        // 4. evaluate
        let after = evaluate(&targets, &trained.validation_predictions).ok_or_else(|| {
            JobFailure::Evaluation {
                message: format!(
                    "expected {} validation predictions, got {}",
                    targets.len(),
                    trained.validation_predictions.len()
                ),
            }
        })?;
        let before = match live.and_then(|r| r.performance_metrics) {
            Some(snapshot) => snapshot,
            None => self.score_live_model(&model_type, &base_version, &inputs, &targets).await,
        };
        job.before_metrics = Some(before);
        job.after_metrics = Some(after);

        // 5. persist
        let artifact_err = |e: crate::registry::ArtifactStoreError| JobFailure::ArtifactStore {
            message: e.to_string(),
        };
        let stored = self
            .deps
            .artifacts
            .load_metadata(&model_type)
            .await
            .map_err(artifact_err)?;
        let version = self.deps.catalog.next_version(&model_type, &stored);
        self.deps
            .artifacts
            .save(&model_type, &version, &trained.artifact, Some(after))
            .await
            .map_err(artifact_err)?;
        job.version = Some(version.clone());

        // 6. promote
        let decision = self.policy.decide(&before, &after);
        job.accuracy_improvement = Some(decision.accuracy_improvement);
        if decision.promote {
            let transition = self
                .policy
                .apply(
                    &self.deps.catalog,
                    self.deps.artifacts.as_ref(),
                    &model_type,
                    &version,
                    after,
                )
                .await
                .map_err(artifact_err)?;
            job.previous_version = transition.from;
            job.promoted = true;
        } else {
            tracing::info!(
                version = %version,
                improvement = decision.accuracy_improvement,
                threshold = self.policy.threshold(),
                "promotion rejected; artifact retained"
            );
        }

        Ok(())
    }

    /// Score the live model on the validation split; zero metrics if it
    /// cannot be loaded or scored.
    async fn score_live_model(
        &self,
        model_type: &str,
        version: &str,
        inputs: &[String],
        targets: &[String],
    ) -> ModelMetrics {
        let scored = async {
            let handle = self.bounded("load", self.deps.backend.load(model_type, version)).await?;
            let predictions = self.bounded("predict", handle.predict(inputs)).await?;
            Ok::<_, JobFailure>(evaluate(targets, &predictions))
        }
        .await;

        match scored {
            Ok(Some(metrics)) => metrics,
            Ok(None) => {
                tracing::warn!(version, "live model returned mismatched predictions; using zero baseline");
                ModelMetrics::default()
            }
            Err(failure) => {
                tracing::warn!(version, failure = %failure, "live model unavailable; using zero baseline");
                ModelMetrics::default()
            }
        }
    }

    async fn bounded<T>(
        &self,
        step: &str,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, JobFailure> {
        match tokio::time::timeout(self.settings.backend_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(JobFailure::BackendFailure {
                message: format!("{step}: {err}"),
            }),
            Err(_) => Err(JobFailure::Timeout {
                step: step.to_string(),
                timeout_ms: u64::try_from(self.settings.backend_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockTrainingBackend, TrainedModel};
    use crate::feedback::InMemoryFeedbackStore;
    use crate::ledger::LedgerEntryKind;
    use crate::registry::FileArtifactStore;

    fn records(n: usize) -> Vec<FeedbackRecord> {
        (0..n)
            .map(|i| {
                let rating = (i % 5 + 1) as u8;
                FeedbackRecord::new("nlp", Some(rating), None, Utc::now(), format!("m{i}"))
                    .with_message_text(format!("question {i}"))
            })
            .collect()
    }

    /// Label for "question {i}" shifted by `shift` stars.
    fn predict(inputs: &[String], shift: usize) -> Vec<String> {
        inputs
            .iter()
            .map(|input| {
                let i: usize = input
                    .trim_start_matches("question ")
                    .parse()
                    .expect("numbered input");
                ((i + shift) % 5 + 1).to_string()
            })
            .collect()
    }

    struct Harness {
        executor: RetrainingExecutor,
        ledger: Arc<LifecycleLedger>,
        catalog: Arc<ModelCatalog>,
        _tmp: tempfile::TempDir,
    }

    async fn harness(
        backend: impl TrainingBackend + Send + Sync + 'static,
        feedback: Vec<FeedbackRecord>,
        timeout: Duration,
    ) -> Harness {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = InMemoryFeedbackStore::new();
        store.extend(feedback).await;

        let ledger = Arc::new(LifecycleLedger::default());
        let catalog = Arc::new(ModelCatalog::with_model_types(&["nlp"]));
        let settings = ExecutorSettings {
            backend_timeout: timeout,
            ..ExecutorSettings::default()
        };
        let deps = ExecutorDeps {
            feedback: Arc::new(store),
            backend: Arc::new(backend),
            artifacts: Arc::new(FileArtifactStore::new(tmp.path()).expect("artifacts")),
            preparer: Arc::new(RatingLabelPreparer),
            catalog: Arc::clone(&catalog),
            ledger: Arc::clone(&ledger),
        };

        Harness {
            executor: RetrainingExecutor::new(settings, PromotionPolicy::default(), deps),
            ledger,
            catalog,
            _tmp: tmp,
        }
    }

    #[test]
    fn preparer_skips_unrated_or_textless_records() {
        let mut input = records(3);
        input[0].rating = None;
        input[1].message_text = None;

        let samples = RatingLabelPreparer.prepare(&input);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].input, "question 2");
        assert_eq!(samples[0].target, "3");
        assert!((samples[0].weight - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn insufficient_data_fails_without_calling_backend() {
        let mut backend = MockTrainingBackend::new();
        backend.expect_train().times(0);

        let h = harness(backend, records(10), Duration::from_secs(5)).await;
        let job = h
            .executor
            .dispatch("nlp", TriggerReason::Manual)
            .expect("accepted")
            .await
            .expect("join");

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.failure,
            Some(JobFailure::InsufficientData {
                available: 10,
                required: 50
            })
        );
        assert!(!h.executor.is_running("nlp"));
        let history = h.ledger.entries_of_kind("nlp", LedgerEntryKind::Retraining);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn backend_error_marks_job_failed() {
        let mut backend = MockTrainingBackend::new();
        backend
            .expect_train()
            .times(1)
            .returning(|_| Err(BackendError::Internal("out of memory".to_string())));

        let h = harness(backend, records(60), Duration::from_secs(5)).await;
        let job = h
            .executor
            .dispatch("nlp", TriggerReason::Scheduled)
            .expect("accepted")
            .await
            .expect("join");

        assert_eq!(job.status, JobStatus::Failed);
        assert!(matches!(job.failure, Some(JobFailure::BackendFailure { .. })));
        assert_eq!(job.training_samples, 60);
        assert_eq!(h.catalog.get("nlp").unwrap().current_production_version, "v1");
    }

    #[tokio::test]
    async fn rejected_promotion_keeps_live_pointer() {
        let mut backend = MockTrainingBackend::new();
        // Always off by one star.
        backend.expect_train().returning(|req| {
            Ok(TrainedModel {
                artifact: b"weights".to_vec(),
                validation_predictions: predict(&req.validation_inputs, 1),
            })
        });
        backend
            .expect_load()
            .returning(|_, _| Err(BackendError::ModelNotFound("nlp/v1".to_string())));

        let h = harness(backend, records(60), Duration::from_secs(5)).await;
        h.catalog.promote(
            "nlp",
            "v1",
            ModelMetrics {
                accuracy: 0.8,
                ..ModelMetrics::default()
            },
        );

        let job = h
            .executor
            .dispatch("nlp", TriggerReason::PerformanceBased)
            .expect("accepted")
            .await
            .expect("join");

        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(!job.promoted);
        assert_eq!(job.version.as_deref(), Some("v2"));
        assert!(job.previous_version.is_none());
        assert_eq!(h.catalog.get("nlp").unwrap().current_production_version, "v1");
    }

    #[tokio::test]
    async fn missing_live_model_gives_zero_baseline() {
        let mut backend = MockTrainingBackend::new();
        backend.expect_train().returning(|req| {
            Ok(TrainedModel {
                artifact: Vec::new(),
                validation_predictions: predict(&req.validation_inputs, 0),
            })
        });
        backend
            .expect_load()
            .times(1)
            .returning(|_, _| Err(BackendError::ModelNotFound("nlp/v1".to_string())));

        let h = harness(backend, records(60), Duration::from_secs(5)).await;
        let job = h
            .executor
            .dispatch("nlp", TriggerReason::Manual)
            .expect("accepted")
            .await
            .expect("join");

        assert_eq!(job.before_metrics, Some(ModelMetrics::default()));
        assert_eq!(job.after_metrics.map(|m| m.accuracy), Some(1.0));
        assert!(job.promoted);
        assert_eq!(job.previous_version.as_deref(), Some("v1"));
    }

    struct HangingBackend;

    #[async_trait::async_trait]
    impl TrainingBackend for HangingBackend {
        async fn train(&self, _request: TrainingRequest) -> Result<TrainedModel, BackendError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(BackendError::Internal("unreachable".to_string()))
        }

        async fn load(
            &self,
            model_type: &str,
            version: &str,
        ) -> Result<Arc<dyn crate::backend::ModelHandle + Send + Sync>, BackendError> {
            Err(BackendError::ModelNotFound(format!("{model_type}/{version}")))
        }
    }

    #[tokio::test]
    async fn backend_timeout_fails_job_and_frees_slot() {
        let h = harness(HangingBackend, records(60), Duration::from_millis(100)).await;

        let handle = h.executor.dispatch("nlp", TriggerReason::Manual).expect("accepted");
        assert!(h.executor.is_running("nlp"));
        assert!(!h.executor.trigger("nlp", TriggerReason::Manual));
        assert_eq!(h.executor.active_jobs(Some("nlp")).len(), 1);

        let job = handle.await.expect("join");
        assert_eq!(
            job.failure,
            Some(JobFailure::Timeout {
                step: "train".to_string(),
                timeout_ms: 100
            })
        );
        assert!(!h.executor.is_running("nlp"));
        assert!(h.executor.active_jobs(None).is_empty());
    }

    struct PanickingBackend;

    #[async_trait::async_trait]
    impl TrainingBackend for PanickingBackend {
        async fn train(&self, _request: TrainingRequest) -> Result<TrainedModel, BackendError> {
            panic!("backend bug");
        }

        async fn load(
            &self,
            _model_type: &str,
            _version: &str,
        ) -> Result<Arc<dyn crate::backend::ModelHandle + Send + Sync>, BackendError> {
            panic!("backend bug");
        }
    }

    #[tokio::test]
    async fn panicking_job_releases_slot_and_is_recorded() {
        let h = harness(PanickingBackend, records(60), Duration::from_secs(5)).await;

        let job = h
            .executor
            .dispatch("nlp", TriggerReason::Manual)
            .expect("accepted")
            .await
            .expect("join");

        assert_eq!(job.status, JobStatus::Failed);
        assert!(matches!(job.failure, Some(JobFailure::Panicked { .. })));
        assert!(!h.executor.is_running("nlp"));
        assert_eq!(h.ledger.retraining_history("nlp").len(), 1);
    }
}
