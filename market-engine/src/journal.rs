//! Transition journal.
//!
//! Every job state change is appended here, in memory and optionally to a
//! JSON-lines file. Entries are never rewritten.

use chrono::{DateTime, Utc};
use ledger::JsonLinesLog;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::error;

use crate::error::Result;
use crate::job::JobState;

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub seq: u64,
    pub job_id: String,
    /// `None` when the job was posted
    pub from: Option<JobState>,
    pub to: JobState,
    /// Event that caused the change
    pub event: String,
    pub at: DateTime<Utc>,
}

/// Append-only record of job transitions.
pub struct TransitionJournal {
    entries: RwLock<Vec<Transition>>,
    next_seq: AtomicU64,
    sink: Option<JsonLinesLog<Transition>>,
}

impl TransitionJournal {
    /// In-memory journal.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(1),
            sink: None,
        }
    }

    /// Journal mirrored to a JSON-lines file. Earlier entries in the file
    /// are loaded so sequence numbers keep increasing.
    pub async fn persistent(path: impl AsRef<Path>) -> Result<Self> {
        let existing = JsonLinesLog::<Transition>::read_all(path.as_ref()).await?;
        let next_seq = existing.iter().map(|t| t.seq).max().unwrap_or(0) + 1;
        let sink = JsonLinesLog::open(path).await?;
        Ok(Self {
            entries: RwLock::new(existing),
            next_seq: AtomicU64::new(next_seq),
            sink: Some(sink),
        })
    }

    /// Record a transition. A failed file append is logged; the in-memory
    /// journal always keeps the entry.
    pub async fn record(
        &self,
        job_id: &str,
        from: Option<JobState>,
        to: JobState,
        event: &str,
    ) -> Transition {
        let transition = Transition {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            job_id: job_id.to_string(),
            from,
            to,
            event: event.to_string(),
            at: Utc::now(),
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(&transition).await {
                error!(job_id, seq = transition.seq, error = %e, "Failed to persist transition");
            }
        }

        self.entries.write().await.push(transition.clone());
        transition
    }

    /// Transitions of one job, oldest first.
    pub async fn for_job(&self, job_id: &str) -> Vec<Transition> {
        let entries = self.entries.read().await;
        entries.iter().filter(|t| t.job_id == job_id).cloned().collect()
    }

    pub async fn all(&self) -> Vec<Transition> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for TransitionJournal {
    fn default() -> Self {
        Self::new()
    }
}
