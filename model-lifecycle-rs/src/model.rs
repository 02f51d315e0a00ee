// model-lifecycle-rs/src/model.rs
// Records shared across the analyzer, executor and promotion paths.
//
// Component-local types (reports, schedule entries, jobs, ledger entries)
// live next to the component that produces them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single user rating of a model response.
///
/// Owned by the feedback store; the orchestrator only reads these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub model_type: String,
    /// Star rating in 1..=5. Values outside that range are treated as unrated.
    pub rating: Option<u8>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Originating chat message.
    pub message_id: String,
    /// Snapshot of the originating message content, used as training input.
    pub message_text: Option<String>,
}

impl FeedbackRecord {
    pub fn new(
        model_type: impl Into<String>,
        rating: Option<u8>,
        note: Option<String>,
        created_at: DateTime<Utc>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model_type: model_type.into(),
            rating,
            note,
            created_at,
            message_id: message_id.into(),
            message_text: None,
        }
    }

    pub fn with_message_text(mut self, text: impl Into<String>) -> Self {
        self.message_text = Some(text.into());
        self
    }

    /// Rating if it is a valid star value.
    pub fn valid_rating(&self) -> Option<u8> {
        self.rating.filter(|r| (1..=5).contains(r))
    }
}

/// Why a retraining job was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    Scheduled,
    PerformanceBased,
    IssueBased,
    Manual,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Scheduled => "scheduled",
            TriggerReason::PerformanceBased => "performance-based",
            TriggerReason::IssueBased => "issue-based",
            TriggerReason::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation metrics for one model version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// The live pointer for a model type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_type: String,
    pub model_name: String,
    pub current_production_version: String,
    pub performance_metrics: Option<ModelMetrics>,
    pub updated_at: DateTime<Utc>,
}

impl ModelRecord {
    pub fn new(model_type: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            model_name: model_name.into(),
            current_production_version: "v1".to_string(),
            performance_metrics: None,
            updated_at: Utc::now(),
        }
    }
}

/// One prepared training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub input: String,
    pub target: String,
    pub weight: f64,
}

/// Parse a `v{n}` version identifier.
///
/// Older identifiers of the form `v{n}.{m}` parse to their major number.
pub fn version_number(version: &str) -> Option<u64> {
    let digits = version.strip_prefix('v')?;
    let major = digits.split('.').next()?;
    major.parse().ok()
}

/// Format a version number as `v{n}`.
pub fn format_version(n: u64) -> String {
    format!("v{n}")
}
