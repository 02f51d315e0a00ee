// model-lifecycle-rs/src/ledger.rs
// Bounded lifecycle history per model type.
//
// Implementation notes:
// - One mutex guards every model type's deque; append and trim happen under
//   it, so readers never observe more than `capacity` entries.
// - When a journal path is configured each entry is also appended as one
//   NDJSON line through a file handle opened once and kept. The journal is
//   never trimmed.
// - Journal write failures are logged; the in-memory history stays authoritative.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::PerformanceReport;
use crate::executor::RetrainingJob;
use crate::scheduler::ScheduleEntry;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryKind {
    Analysis,
    Schedule,
    Retraining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerPayload {
    Analysis(PerformanceReport),
    Schedule(ScheduleEntry),
    Retraining(RetrainingJob),
}

impl LedgerPayload {
    pub fn kind(&self) -> LedgerEntryKind {
        match self {
            LedgerPayload::Analysis(_) => LedgerEntryKind::Analysis,
            LedgerPayload::Schedule(_) => LedgerEntryKind::Schedule,
            LedgerPayload::Retraining(_) => LedgerEntryKind::Retraining,
        }
    }

    fn model_type(&self) -> &str {
        match self {
            LedgerPayload::Analysis(r) => &r.model_type,
            LedgerPayload::Schedule(s) => &s.model_type,
            LedgerPayload::Retraining(j) => &j.model_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub model_type: String,
    pub kind: LedgerEntryKind,
    pub payload: LedgerPayload,
    pub timestamp: DateTime<Utc>,
}

/// Append-only NDJSON sink. The file is opened on first use and reopened
/// after a failed write.
struct Journal {
    path: PathBuf,
    file: Option<File>,
}

impl Journal {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    fn append(&mut self, entry: &LedgerEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        // A handle that failed a write is dropped and reopened next time.
        let mut file = match self.file.take() {
            Some(file) => file,
            None => open_journal(&self.path)?,
        };
        file.write_all(&line)?;
        self.file = Some(file);
        Ok(())
    }
}

pub struct LifecycleLedger {
    capacity: usize,
    journal: Option<Mutex<Journal>>,
    entries: Mutex<HashMap<String, VecDeque<LedgerEntry>>>,
}

impl LifecycleLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            journal: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Also append every entry to the NDJSON file at `path`.
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal = Some(Mutex::new(Journal::new(path.into())));
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&self, payload: LedgerPayload) -> LedgerEntry {
        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            model_type: payload.model_type().to_string(),
            kind: payload.kind(),
            payload,
            timestamp: Utc::now(),
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(journal) = &self.journal {
            let mut journal = journal.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = journal.append(&entry) {
                tracing::warn!(error = %err, path = %journal.path.display(), "ledger journal write failed");
            }
        }

        let history = entries.entry(entry.model_type.clone()).or_default();
        history.push_back(entry.clone());
        while history.len() > self.capacity {
            history.pop_front();
        }

        entry
    }

    pub fn record_analysis(&self, report: PerformanceReport) -> LedgerEntry {
        self.append(LedgerPayload::Analysis(report))
    }

    pub fn record_schedule(&self, schedule: ScheduleEntry) -> LedgerEntry {
        self.append(LedgerPayload::Schedule(schedule))
    }

    pub fn record_retraining(&self, job: RetrainingJob) -> LedgerEntry {
        self.append(LedgerPayload::Retraining(job))
    }

    /// Entries for `model_type`, oldest first.
    pub fn entries(&self, model_type: &str) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_type)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entries_of_kind(&self, model_type: &str, kind: LedgerEntryKind) -> Vec<LedgerEntry> {
        self.entries(model_type)
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    /// Completed retraining jobs for `model_type`, oldest first.
    pub fn retraining_history(&self, model_type: &str) -> Vec<RetrainingJob> {
        self.entries(model_type)
            .into_iter()
            .filter_map(|e| match e.payload {
                LedgerPayload::Retraining(job) => Some(job),
                _ => None,
            })
            .collect()
    }

    /// Analysis reports for `model_type`, oldest first.
    pub fn analyses(&self, model_type: &str) -> Vec<PerformanceReport> {
        self.entries(model_type)
            .into_iter()
            .filter_map(|e| match e.payload {
                LedgerPayload::Analysis(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    pub fn model_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    pub fn len(&self, model_type: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_type)
            .map_or(0, VecDeque::len)
    }
}

impl Default for LifecycleLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn open_journal(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
