// model-lifecycle-rs/src/feedback.rs
// Feedback store seam.
//
// The orchestrator is a read-only consumer of feedback. The file-backed
// store additionally exposes `append` for the ingestion side (API layer).
//
// Implementation notes:
// - Append-only NDJSON file on disk (one FeedbackRecord per line).
// - Malformed lines (bad JSON or bad UTF-8) are logged and skipped so one
//   bad write cannot break analysis for every model type.
// - Appends are serialized through a mutex and each record goes out as a
//   single write, so concurrent appends never interleave within a line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::model::FeedbackRecord;

/// Inclusive time range used for feedback queries and analysis windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` days ending at `end`.
    pub fn last_days(days: i64, end: DateTime<Utc>) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Feedback store error type.
#[derive(Debug, thiserror::Error)]
pub enum FeedbackStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("feedback store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait FeedbackStore {
    /// All records for `model_type` created within `range`.
    async fn query(
        &self,
        model_type: &str,
        range: TimeRange,
    ) -> Result<Vec<FeedbackRecord>, FeedbackStoreError>;
}

/// File-backed store holding records as NDJSON.
///
/// Suitable for local development or single-node deployments; a database
/// backed store can be wired behind the same trait.
pub struct FileBackedFeedbackStore {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl FileBackedFeedbackStore {
    /// Create a store at `path`, creating the parent directory eagerly so a
    /// bad path fails at startup instead of at the first query.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, FeedbackStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            // One-time startup check.
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            append_lock: Mutex::new(()),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record (ingestion side).
    pub async fn append(&self, record: &FeedbackRecord) -> Result<(), FeedbackStoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.append_lock.lock().await;
        if let Some(parent) = self.path().parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<FeedbackRecord>, FeedbackStoreError> {
        let buf = match fs::read(self.path()).await {
            Ok(buf) => buf,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::new();
        for (idx, line) in buf.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<FeedbackRecord>(line) {
                Ok(rec) => out.push(rec),
                Err(err) => {
                    tracing::warn!(line = idx + 1, error = %err, "failed to parse FeedbackRecord line; skipping");
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl FeedbackStore for FileBackedFeedbackStore {
    async fn query(
        &self,
        model_type: &str,
        range: TimeRange,
    ) -> Result<Vec<FeedbackRecord>, FeedbackStoreError> {
        let all = self.read_all().await?;
        Ok(all
            .into_iter()
            .filter(|r| r.model_type == model_type && range.contains(r.created_at))
            .collect())
    }
}

/// In-process store, used by embedders that already hold feedback in memory.
#[derive(Default)]
pub struct InMemoryFeedbackStore {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: FeedbackRecord) {
        self.records.write().await.push(record);
    }

    pub async fn extend(&self, records: impl IntoIterator<Item = FeedbackRecord>) {
        self.records.write().await.extend(records);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn query(
        &self,
        model_type: &str,
        range: TimeRange,
    ) -> Result<Vec<FeedbackRecord>, FeedbackStoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.model_type == model_type && range.contains(r.created_at))
            .cloned()
            .collect())
    }
}
