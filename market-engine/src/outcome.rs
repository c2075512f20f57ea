//! Outcome feedback channel.
//!
//! The orchestrator writes one record per terminal job outcome and per
//! failed negotiation. The threshold tuner reads them in batches from its
//! own cursor; nothing on the job path ever waits for a reader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{EngineError, Result};

/// How a job or negotiation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    /// Quality passed and funds were released
    CompletedPaid,
    /// Disputed and split
    Resolved,
    /// Negotiation ran out of rounds
    NegotiationExpired,
    /// Bounds too far apart to negotiate
    NegotiationRejected,
}

impl FinalStatus {
    pub fn is_negotiation_failure(&self) -> bool {
        matches!(self, Self::NegotiationExpired | Self::NegotiationRejected)
    }

    pub fn is_job_outcome(&self) -> bool {
        matches!(self, Self::CompletedPaid | Self::Resolved)
    }
}

/// One outcome record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub job_id: String,
    pub contract_id: Option<String>,
    pub final_status: FinalStatus,
    /// Quality similarity for job outcomes
    pub rating: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(
        job_id: impl Into<String>,
        contract_id: Option<String>,
        final_status: FinalStatus,
        rating: Option<f64>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            contract_id,
            final_status,
            rating,
            recorded_at: Utc::now(),
        }
    }
}

/// A batch read from the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeBatch {
    pub records: Vec<OutcomeRecord>,
    /// Cursor for the next read
    pub next_cursor: usize,
}

/// Append-only outcome channel.
#[derive(Default)]
pub struct OutcomeLog {
    records: RwLock<Vec<OutcomeRecord>>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: OutcomeRecord) {
        debug!(
            job_id = %record.job_id,
            final_status = ?record.final_status,
            "Outcome recorded"
        );
        self.records.write().await.push(record);
    }

    /// Up to `limit` records starting at `cursor`.
    pub async fn read_batch(&self, cursor: usize, limit: usize) -> Result<OutcomeBatch> {
        let records = self.records.read().await;
        if cursor > records.len() {
            return Err(EngineError::Validation(format!(
                "outcome cursor {} beyond end {}",
                cursor,
                records.len()
            )));
        }

        let end = cursor.saturating_add(limit).min(records.len());
        Ok(OutcomeBatch {
            records: records[cursor..end].to_vec(),
            next_cursor: end,
        })
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batches_advance_cursor() {
        let log = OutcomeLog::new();
        for i in 0..5 {
            log.record(OutcomeRecord::new(
                format!("job-{}", i),
                None,
                FinalStatus::CompletedPaid,
                Some(0.9),
            ))
            .await;
        }

        let first = log.read_batch(0, 3).await.unwrap();
        assert_eq!(first.records.len(), 3);
        assert_eq!(first.next_cursor, 3);

        let second = log.read_batch(first.next_cursor, 3).await.unwrap();
        assert_eq!(second.records.len(), 2);
        assert_eq!(second.records[0].job_id, "job-3");

        let empty = log.read_batch(second.next_cursor, 3).await.unwrap();
        assert!(empty.records.is_empty());
        assert_eq!(empty.next_cursor, 5);

        assert!(log.read_batch(9, 3).await.is_err());
    }
}
