//! Audit trail for negotiation proposals.
//!
//! Every proposal made in any negotiation is retained here for the life of
//! the log, and optionally mirrored to a JSON-lines file so the trail
//! survives restarts. Records are never modified or dropped once logged.

use ledger::{JsonLinesLog, LedgerError};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::negotiation::Proposal;

/// Log of proposals across all negotiations.
pub struct ProposalLog {
    /// Log entries (oldest first)
    entries: RwLock<Vec<Proposal>>,
    sink: Option<JsonLinesLog<Proposal>>,
}

impl ProposalLog {
    /// Create a new in-memory audit log.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            sink: None,
        }
    }

    /// Audit log mirrored to a JSON-lines file. Proposals already in the
    /// file are loaded first.
    pub async fn persistent(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let existing = JsonLinesLog::<Proposal>::read_all(path.as_ref()).await?;
        let sink = JsonLinesLog::open(path.as_ref()).await?;
        info!(
            path = %path.as_ref().display(),
            loaded = existing.len(),
            "Proposal log opened"
        );
        Ok(Self {
            entries: RwLock::new(existing),
            sink: Some(sink),
        })
    }

    /// Record a settled proposal. A failed file append is logged; the
    /// in-memory trail always keeps the proposal.
    pub async fn record(&self, proposal: Proposal) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(&proposal).await {
                error!(
                    job_id = %proposal.job_id,
                    round = proposal.round,
                    error = %e,
                    "Failed to persist proposal"
                );
            }
        }
        self.entries.write().await.push(proposal);
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<Proposal> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Proposals for a job, in the order they were made.
    pub async fn for_job(&self, job_id: &str) -> Vec<Proposal> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|p| p.job_id == job_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ProposalLog {
    fn default() -> Self {
        Self::new()
    }
}
