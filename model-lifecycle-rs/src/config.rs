// model-lifecycle-rs/src/config.rs
// Orchestrator configuration.

use std::path::PathBuf;
use std::time::Duration;

use config_rs::{env_list, env_opt_string, env_parse, env_path, env_string};

use crate::scheduler::ScheduleKind;

const DEFAULT_MODEL_TYPES: &[&str] = &["nlp", "recommendation", "translation"];

/// Tunables for analysis, retraining, promotion and the monitor loop.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Model types the monitor always analyzes.
    pub model_types: Vec<String>,
    pub analysis_window_days: i64,
    pub training_window_days: i64,
    pub min_training_samples: usize,
    pub validation_fraction: f64,
    pub split_seed: u64,
    /// Minimum accuracy gain (strictly greater) required to promote.
    pub promotion_threshold: f64,
    /// Reports below this confidence trigger performance-based retraining.
    pub confidence_threshold: f64,
    /// More issues than this trigger issue-based retraining.
    pub issue_count_threshold: usize,
    pub ledger_capacity: usize,
    pub poll_interval: Duration,
    pub retry_interval: Duration,
    pub backend_timeout: Duration,
    pub artifact_retention_days: i64,
    pub artifact_root: PathBuf,
    pub feedback_path: PathBuf,
    pub ledger_journal: Option<PathBuf>,
    pub backend_url: String,
    /// Schedule registered for every model type at startup.
    pub default_schedule: Option<ScheduleKind>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            model_types: DEFAULT_MODEL_TYPES.iter().map(|s| s.to_string()).collect(),
            analysis_window_days: 30,
            training_window_days: 30,
            min_training_samples: 50,
            validation_fraction: 0.2,
            split_seed: 42,
            promotion_threshold: 0.10,
            confidence_threshold: 0.6,
            issue_count_threshold: 5,
            ledger_capacity: 50,
            poll_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(60),
            backend_timeout: Duration::from_secs(600),
            artifact_retention_days: 30,
            artifact_root: PathBuf::from("./data/models"),
            feedback_path: PathBuf::from("./data/feedback/feedback.ndjson"),
            ledger_journal: None,
            backend_url: "http://localhost:8500".to_string(),
            default_schedule: None,
        }
    }
}

impl LifecycleConfig {
    /// Read `LIFECYCLE_*` variables, falling back to defaults; never panics.
    pub fn from_env() -> Self {
        let d = Self::default();

        let default_schedule = env_opt_string("LIFECYCLE_DEFAULT_SCHEDULE").and_then(|raw| {
            raw.parse::<ScheduleKind>()
                .map_err(|e| tracing::warn!(error = %e, "ignoring LIFECYCLE_DEFAULT_SCHEDULE"))
                .ok()
        });

        Self {
            model_types: env_list("LIFECYCLE_MODEL_TYPES", DEFAULT_MODEL_TYPES),
            analysis_window_days: env_parse("LIFECYCLE_ANALYSIS_WINDOW_DAYS", d.analysis_window_days)
                .max(1),
            training_window_days: env_parse("LIFECYCLE_TRAINING_WINDOW_DAYS", d.training_window_days)
                .max(1),
            min_training_samples: env_parse("LIFECYCLE_MIN_TRAINING_SAMPLES", d.min_training_samples),
            validation_fraction: env_parse("LIFECYCLE_VALIDATION_FRACTION", d.validation_fraction)
                .clamp(0.0, 1.0),
            split_seed: env_parse("LIFECYCLE_SPLIT_SEED", d.split_seed),
            promotion_threshold: env_parse("LIFECYCLE_PROMOTION_THRESHOLD", d.promotion_threshold),
            confidence_threshold: env_parse("LIFECYCLE_CONFIDENCE_THRESHOLD", d.confidence_threshold),
            issue_count_threshold: env_parse("LIFECYCLE_ISSUE_COUNT_THRESHOLD", d.issue_count_threshold),
            ledger_capacity: env_parse("LIFECYCLE_LEDGER_CAPACITY", d.ledger_capacity).max(1),
            poll_interval: Duration::from_secs(env_parse("LIFECYCLE_POLL_INTERVAL_SECS", 300u64).max(1)),
            retry_interval: Duration::from_secs(env_parse("LIFECYCLE_RETRY_INTERVAL_SECS", 60u64).max(1)),
            backend_timeout: Duration::from_secs(
                env_parse("LIFECYCLE_BACKEND_TIMEOUT_SECS", 600u64).max(1),
            ),
            artifact_retention_days: env_parse(
                "LIFECYCLE_ARTIFACT_RETENTION_DAYS",
                d.artifact_retention_days,
            ),
            artifact_root: env_path("LIFECYCLE_ARTIFACT_ROOT", "./data/models"),
            feedback_path: env_path("LIFECYCLE_FEEDBACK_PATH", "./data/feedback/feedback.ndjson"),
            ledger_journal: env_opt_string("LIFECYCLE_LEDGER_JOURNAL").map(PathBuf::from),
            backend_url: env_string("LIFECYCLE_BACKEND_URL", &d.backend_url),
            default_schedule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = LifecycleConfig::default();
        assert_eq!(cfg.model_types, vec!["nlp", "recommendation", "translation"]);
        assert_eq!(cfg.min_training_samples, 50);
        assert_eq!(cfg.ledger_capacity, 50);
        assert_eq!(cfg.poll_interval, Duration::from_secs(300));
        assert_eq!(cfg.retry_interval, Duration::from_secs(60));
        assert_eq!(cfg.backend_timeout, Duration::from_secs(600));
        assert!((cfg.promotion_threshold - 0.10).abs() < f64::EPSILON);
        assert!(cfg.default_schedule.is_none());
    }

    #[test]
    fn from_env_reads_overrides() {
        std::env::set_var("LIFECYCLE_PROMOTION_THRESHOLD", "0.2");
        std::env::set_var("LIFECYCLE_DEFAULT_SCHEDULE", "weekly");
        std::env::set_var("LIFECYCLE_ISSUE_COUNT_THRESHOLD", "not-a-number");

        let cfg = LifecycleConfig::from_env();
        assert!((cfg.promotion_threshold - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.default_schedule, Some(ScheduleKind::Weekly));
        assert_eq!(cfg.issue_count_threshold, 5);

        std::env::remove_var("LIFECYCLE_PROMOTION_THRESHOLD");
        std::env::remove_var("LIFECYCLE_DEFAULT_SCHEDULE");
        std::env::remove_var("LIFECYCLE_ISSUE_COUNT_THRESHOLD");
    }
}
