// model-lifecycle-rs/src/scheduler.rs
// Retraining schedules.
//
// Entries are held in memory keyed by id and are never deleted, only paused.
// The scheduler only decides what is due; dispatch belongs to the monitor.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

/// Upper bound for interval overrides (ten years).
const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    Daily,
    Weekly,
    Monthly,
    OnDemand,
}

impl ScheduleKind {
    pub fn offset(&self) -> Duration {
        match self {
            ScheduleKind::Daily => Duration::days(1),
            ScheduleKind::Weekly => Duration::days(7),
            ScheduleKind::Monthly => Duration::days(30),
            ScheduleKind::OnDemand => Duration::hours(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
            ScheduleKind::Monthly => "monthly",
            ScheduleKind::OnDemand => "on-demand",
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(ScheduleKind::Daily),
            "weekly" => Ok(ScheduleKind::Weekly),
            "monthly" => Ok(ScheduleKind::Monthly),
            "on-demand" | "on_demand" | "ondemand" => Ok(ScheduleKind::OnDemand),
            other => Err(SchedulerError::UnknownKind(other.to_string())),
        }
    }
}

/// Conditions attached to a schedule.
///
/// `min_feedback_count` and `performance_threshold` gate on-demand entries;
/// periodic entries dispatch whenever they are due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConditions {
    pub min_feedback_count: usize,
    pub performance_threshold: f64,
    /// Replaces the kind's offset when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
}

impl Default for TriggerConditions {
    fn default() -> Self {
        Self {
            min_feedback_count: 100,
            performance_threshold: 0.7,
            interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: String,
    pub model_type: String,
    pub kind: ScheduleKind,
    pub conditions: TriggerConditions,
    pub created_at: DateTime<Utc>,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub status: ScheduleStatus,
}

impl ScheduleEntry {
    pub fn offset(&self) -> Duration {
        match self.conditions.interval_secs {
            Some(secs) if secs > 0 => Duration::seconds(secs.min(MAX_INTERVAL_SECS) as i64),
            _ => self.kind.offset(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active && now >= self.next_run
    }

    /// On-demand entries only dispatch when their conditions hold.
    pub fn is_conditional(&self) -> bool {
        self.kind == ScheduleKind::OnDemand
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("interval override must be greater than zero")]
    ZeroInterval,

    #[error("unknown schedule kind: {0}")]
    UnknownKind(String),

    #[error("schedule not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Default, Clone)]
pub struct RetrainingScheduler {
    entries: Arc<RwLock<HashMap<String, ScheduleEntry>>>,
}

impl RetrainingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schedule and return its id.
    #[instrument(skip_all, fields(model_type = %model_type, kind = %kind))]
    pub async fn schedule(
        &self,
        model_type: &str,
        kind: ScheduleKind,
        conditions: TriggerConditions,
        now: DateTime<Utc>,
    ) -> Result<String, SchedulerError> {
        if conditions.interval_secs == Some(0) {
            return Err(SchedulerError::ZeroInterval);
        }

        let mut entry = ScheduleEntry {
            id: Uuid::new_v4().to_string(),
            model_type: model_type.to_string(),
            kind,
            conditions,
            created_at: now,
            next_run: now,
            last_run: None,
            run_count: 0,
            status: ScheduleStatus::Active,
        };
        entry.next_run = now + entry.offset();

        let id = entry.id.clone();
        tracing::info!(schedule_id = %id, next_run = %entry.next_run, "retraining scheduled");
        self.entries.write().await.insert(id.clone(), entry);
        Ok(id)
    }

    /// Active entries with `next_run <= now`, oldest first.
    pub async fn next_due(&self, now: DateTime<Utc>) -> Vec<ScheduleEntry> {
        let entries = self.entries.read().await;
        let mut due: Vec<ScheduleEntry> = entries
            .values()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_run);
        due
    }

    /// Record a dispatch at `dispatched_at` and move `next_run` forward from it.
    pub async fn advance(
        &self,
        id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> Result<ScheduleEntry, SchedulerError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        entry.next_run = dispatched_at + entry.offset();
        entry.last_run = Some(dispatched_at);
        entry.run_count += 1;
        Ok(entry.clone())
    }

    /// Move `next_run` forward without counting a run.
    pub async fn defer(&self, id: &str, now: DateTime<Utc>) -> Result<ScheduleEntry, SchedulerError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        entry.next_run = now + entry.offset();
        Ok(entry.clone())
    }

    /// Returns false for unknown ids.
    pub async fn pause(&self, id: &str) -> bool {
        match self.entries.write().await.get_mut(id) {
            Some(entry) => {
                entry.status = ScheduleStatus::Paused;
                tracing::info!(schedule_id = %id, model_type = %entry.model_type, "schedule paused");
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: &str) -> Option<ScheduleEntry> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn list(&self, model_type: Option<&str>) -> Vec<ScheduleEntry> {
        let entries = self.entries.read().await;
        let mut out: Vec<ScheduleEntry> = entries
            .values()
            .filter(|e| model_type.map_or(true, |mt| e.model_type == mt))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        out
    }

    pub async fn model_types(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut types: Vec<String> = entries.values().map(|e| e.model_type.clone()).collect();
        types.sort();
        types.dedup();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn next_run_uses_kind_offset() {
        let s = RetrainingScheduler::new();
        for (kind, days) in [
            (ScheduleKind::Daily, 1),
            (ScheduleKind::Weekly, 7),
            (ScheduleKind::Monthly, 30),
        ] {
            let id = s
                .schedule("nlp", kind, TriggerConditions::default(), t0())
                .await
                .expect("schedule");
            let e = s.get(&id).await.expect("entry");
            assert_eq!(e.next_run, t0() + Duration::days(days));
            assert_eq!(e.status, ScheduleStatus::Active);
        }

        let id = s
            .schedule("nlp", ScheduleKind::OnDemand, TriggerConditions::default(), t0())
            .await
            .expect("schedule");
        assert_eq!(s.get(&id).await.unwrap().next_run, t0() + Duration::hours(1));
    }

    #[tokio::test]
    async fn interval_override_and_zero_rejection() {
        let s = RetrainingScheduler::new();
        let cond = TriggerConditions {
            interval_secs: Some(90),
            ..TriggerConditions::default()
        };
        let id = s.schedule("nlp", ScheduleKind::Weekly, cond, t0()).await.expect("schedule");
        assert_eq!(s.get(&id).await.unwrap().next_run, t0() + Duration::seconds(90));

        let zero = TriggerConditions {
            interval_secs: Some(0),
            ..TriggerConditions::default()
        };
        let err = s.schedule("nlp", ScheduleKind::Daily, zero, t0()).await;
        assert!(matches!(err, Err(SchedulerError::ZeroInterval)));
        assert_eq!(s.list(None).await.len(), 1);
    }

    #[tokio::test]
    async fn weekly_entry_is_due_after_seven_days_and_advances_without_drift() {
        let s = RetrainingScheduler::new();
        let id = s
            .schedule("nlp", ScheduleKind::Weekly, TriggerConditions::default(), t0())
            .await
            .expect("schedule");

        assert!(s.next_due(t0() + Duration::days(6)).await.is_empty());

        let dispatched = t0() + Duration::days(7) + Duration::minutes(3);
        let due = s.next_due(dispatched).await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);

        let e = s.advance(&id, dispatched).await.expect("advance");
        assert_eq!(e.run_count, 1);
        assert_eq!(e.last_run, Some(dispatched));
        assert_eq!(e.next_run, dispatched + Duration::days(7));
        assert!(e.next_run > dispatched);
        assert!(s.next_due(dispatched).await.is_empty());
    }

    #[tokio::test]
    async fn defer_moves_next_run_without_counting() {
        let s = RetrainingScheduler::new();
        let id = s
            .schedule("nlp", ScheduleKind::OnDemand, TriggerConditions::default(), t0())
            .await
            .expect("schedule");
        let later = t0() + Duration::hours(2);
        let e = s.defer(&id, later).await.expect("defer");
        assert_eq!(e.run_count, 0);
        assert!(e.last_run.is_none());
        assert_eq!(e.next_run, later + Duration::hours(1));
    }

    #[tokio::test]
    async fn paused_entries_are_never_due() {
        let s = RetrainingScheduler::new();
        let id = s
            .schedule("nlp", ScheduleKind::Daily, TriggerConditions::default(), t0())
            .await
            .expect("schedule");

        assert!(s.pause(&id).await);
        assert!(!s.pause("missing").await);
        assert!(s.next_due(t0() + Duration::days(30)).await.is_empty());
        assert_eq!(s.get(&id).await.unwrap().status, ScheduleStatus::Paused);
    }

    #[tokio::test]
    async fn list_filters_by_model_type() {
        let s = RetrainingScheduler::new();
        s.schedule("nlp", ScheduleKind::Daily, TriggerConditions::default(), t0())
            .await
            .expect("schedule");
        s.schedule("translation", ScheduleKind::Daily, TriggerConditions::default(), t0())
            .await
            .expect("schedule");

        assert_eq!(s.list(Some("nlp")).await.len(), 1);
        assert_eq!(s.list(None).await.len(), 2);
        assert_eq!(s.model_types().await, vec!["nlp", "translation"]);
        assert!(matches!(
            s.advance("missing", t0()).await,
            Err(SchedulerError::NotFound(_))
        ));
    }

    #[test]
    fn kind_parses_from_config_strings() {
        assert_eq!("Weekly".parse::<ScheduleKind>().unwrap(), ScheduleKind::Weekly);
        assert_eq!("on-demand".parse::<ScheduleKind>().unwrap(), ScheduleKind::OnDemand);
        assert!("hourly".parse::<ScheduleKind>().is_err());
    }
}
