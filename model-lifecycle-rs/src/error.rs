// model-lifecycle-rs/src/error.rs

use crate::backend::BackendError;
use crate::feedback::FeedbackStoreError;
use crate::registry::ArtifactStoreError;
use crate::scheduler::SchedulerError;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Top-level error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("feedback store error: {0}")]
    Feedback(#[from] FeedbackStoreError),

    #[error("training backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("artifact store error: {0}")]
    Artifacts(#[from] ArtifactStoreError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("no training data for {model_type}")]
    NoTrainingData { model_type: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
