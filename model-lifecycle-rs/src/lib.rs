// model-lifecycle-rs/src/lib.rs
// Library interface for the Model Lifecycle Orchestrator.
//
// The orchestrator watches deployed models through user feedback, decides
// when a model type needs retraining, runs retraining jobs off the serving
// path and promotes new versions that beat the live one.
//
// Design notes:
// - Collaborators (feedback store, training backend, artifact store, data
//   preparer) are injected as trait objects; the file and HTTP
//   implementations here are the defaults the binary wires up.
// - No process-wide state. Everything hangs off a `LifecycleOrchestrator`
//   with an explicit start/stop lifecycle.

pub mod analyzer;
pub mod backend;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod executor;
pub mod feedback;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod orchestrator;
pub mod promotion;
pub mod registry;
pub mod scheduler;


pub use analyzer::{PerformanceAnalyzer, PerformanceReport, PerformanceTrend};
pub use backend::{BackendError, HttpTrainingBackend, ModelHandle, TrainedModel, TrainingBackend, TrainingRequest};
pub use config::LifecycleConfig;
pub use error::{LifecycleError, Result};
pub use executor::{DataPreparer, JobFailure, JobStatus, RatingLabelPreparer, RetrainingJob};
pub use feedback::{FeedbackStore, FileBackedFeedbackStore, InMemoryFeedbackStore, TimeRange};
pub use ledger::{LedgerEntry, LedgerEntryKind, LifecycleLedger};
pub use model::{FeedbackRecord, ModelMetrics, ModelRecord, TrainingSample, TriggerReason};
pub use orchestrator::{Collaborators, LifecycleOrchestrator, LifecycleStatus, ModelInfo, OptimizationStatus};
pub use registry::{ArtifactStore, FileArtifactStore, ModelCatalog};
pub use scheduler::{ScheduleKind, TriggerConditions};
