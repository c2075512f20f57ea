//! Background threshold tuning.
//!
//! Periodically reads outcome records and nudges the matching threshold and
//! negotiation tolerance. Adjustments are best-effort: a failed pass is
//! logged and the next interval tries again. Job workers only ever read the
//! shared thresholds, so nothing here can block them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use market_agent::{ThresholdSnapshot, Thresholds};

use crate::config::TuningConfig;
use crate::error::Result;
use crate::outcome::{FinalStatus, OutcomeLog, OutcomeRecord};

/// Matching success rate below which the threshold is raised.
const LOW_SUCCESS_RATE: f64 = 0.6;
/// Matching success rate above which the threshold is relaxed.
const HIGH_SUCCESS_RATE: f64 = 0.8;
const THRESHOLD_RAISE: f64 = 0.05;
const THRESHOLD_RELAX: f64 = 0.02;

/// Negotiation failure rate above which tolerance widens.
const HIGH_FAILURE_RATE: f64 = 0.5;
/// Negotiation failure rate below which tolerance narrows.
const LOW_FAILURE_RATE: f64 = 0.1;
const TOLERANCE_STEP: f64 = 0.01;

/// Result of one tuning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningReport {
    pub samples: usize,
    pub previous: ThresholdSnapshot,
    pub current: ThresholdSnapshot,
}

impl TuningReport {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Adjusts shared thresholds from outcome statistics.
pub struct ThresholdTuner {
    config: TuningConfig,
    thresholds: Thresholds,
    outcomes: Arc<OutcomeLog>,
    cursor: Mutex<usize>,
}

impl ThresholdTuner {
    pub fn new(config: TuningConfig, thresholds: Thresholds, outcomes: Arc<OutcomeLog>) -> Self {
        Self {
            config,
            thresholds,
            outcomes,
            cursor: Mutex::new(0),
        }
    }

    /// Run one tuning pass. `None` when there were too few new outcomes.
    pub async fn tick(&self) -> Result<Option<TuningReport>> {
        let mut cursor = self.cursor.lock().await;
        let batch = self
            .outcomes
            .read_batch(*cursor, self.config.batch_size)
            .await?;

        if batch.records.len() < self.config.min_samples {
            debug!(
                samples = batch.records.len(),
                min_samples = self.config.min_samples,
                "Not enough outcomes to tune"
            );
            return Ok(None);
        }
        *cursor = batch.next_cursor;

        let previous = self.thresholds.snapshot().await;
        let current = adjust(&self.config, previous, &batch.records);
        if current != previous {
            self.thresholds.update(current).await;
            info!(
                samples = batch.records.len(),
                matching_from = previous.matching,
                matching_to = current.matching,
                tolerance_from = previous.negotiation_tolerance,
                tolerance_to = current.negotiation_tolerance,
                "Thresholds adjusted"
            );
        }

        Ok(Some(TuningReport {
            samples: batch.records.len(),
            previous,
            current,
        }))
    }

    /// Run [`tick`](Self::tick) on an interval until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = self.tick().await {
                    warn!(error = %e, "Threshold tuning pass failed");
                }
            }
        })
    }
}

/// New thresholds for a batch of outcomes.
pub fn adjust(
    config: &TuningConfig,
    current: ThresholdSnapshot,
    records: &[OutcomeRecord],
) -> ThresholdSnapshot {
    let completed = records
        .iter()
        .filter(|r| r.final_status == FinalStatus::CompletedPaid)
        .count();
    let job_outcomes = records.iter().filter(|r| r.final_status.is_job_outcome()).count();
    let failures = records
        .iter()
        .filter(|r| r.final_status.is_negotiation_failure())
        .count();

    let mut next = current;

    if job_outcomes > 0 {
        let success_rate = completed as f64 / job_outcomes as f64;
        if success_rate < LOW_SUCCESS_RATE {
            next.matching += THRESHOLD_RAISE;
        } else if success_rate > HIGH_SUCCESS_RATE {
            next.matching -= THRESHOLD_RELAX;
        }
        next.matching = config.matching_bounds.clamp(next.matching);
    }

    let negotiations = failures + job_outcomes;
    if negotiations > 0 {
        let failure_rate = failures as f64 / negotiations as f64;
        if failure_rate > HIGH_FAILURE_RATE {
            next.negotiation_tolerance += TOLERANCE_STEP;
        } else if failure_rate < LOW_FAILURE_RATE {
            next.negotiation_tolerance -= TOLERANCE_STEP;
        }
        next.negotiation_tolerance = config.tolerance_bounds.clamp(next.negotiation_tolerance);
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(statuses: &[(FinalStatus, usize)]) -> Vec<OutcomeRecord> {
        statuses
            .iter()
            .flat_map(|(status, n)| {
                (0..*n).map(move |i| OutcomeRecord::new(format!("job-{}", i), None, *status, None))
            })
            .collect()
    }

    fn snapshot(matching: f64, tolerance: f64) -> ThresholdSnapshot {
        ThresholdSnapshot {
            matching,
            negotiation_tolerance: tolerance,
        }
    }

    #[test]
    fn test_low_success_raises_threshold() {
        let batch = records(&[(FinalStatus::CompletedPaid, 5), (FinalStatus::Resolved, 5)]);
        let next = adjust(&TuningConfig::default(), snapshot(0.75, 0.15), &batch);
        assert!((next.matching - 0.80).abs() < 1e-9);
        // No negotiation failures at all
        assert!((next.negotiation_tolerance - 0.14).abs() < 1e-9);
    }

    #[test]
    fn test_high_success_relaxes_threshold() {
        let batch = records(&[(FinalStatus::CompletedPaid, 9), (FinalStatus::Resolved, 1)]);
        let next = adjust(&TuningConfig::default(), snapshot(0.75, 0.15), &batch);
        assert!((next.matching - 0.73).abs() < 1e-9);
    }

    #[test]
    fn test_frequent_negotiation_failures_widen_tolerance() {
        let batch = records(&[
            (FinalStatus::NegotiationExpired, 4),
            (FinalStatus::NegotiationRejected, 3),
            (FinalStatus::CompletedPaid, 3),
        ]);
        let next = adjust(&TuningConfig::default(), snapshot(0.75, 0.15), &batch);
        assert!((next.negotiation_tolerance - 0.16).abs() < 1e-9);
    }

    #[test]
    fn test_adjustments_are_clamped() {
        let batch = records(&[(FinalStatus::Resolved, 10)]);
        let next = adjust(&TuningConfig::default(), snapshot(0.94, 0.05), &batch);
        assert_eq!(next.matching, 0.95);
        assert_eq!(next.negotiation_tolerance, 0.05);
    }

    #[tokio::test]
    async fn test_tick_needs_min_samples() {
        let outcomes = Arc::new(OutcomeLog::new());
        let thresholds = Thresholds::new(0.75, 0.15);
        let tuner = ThresholdTuner::new(TuningConfig::default(), thresholds.clone(), Arc::clone(&outcomes));

        for record in records(&[(FinalStatus::Resolved, 5)]) {
            outcomes.record(record).await;
        }
        assert!(tuner.tick().await.unwrap().is_none());
        assert_eq!(thresholds.snapshot().await.matching, 0.75);

        for record in records(&[(FinalStatus::Resolved, 5)]) {
            outcomes.record(record).await;
        }
        let report = tuner.tick().await.unwrap().unwrap();
        assert_eq!(report.samples, 10);
        assert!(report.changed());
        assert!((thresholds.snapshot().await.matching - 0.80).abs() < 1e-9);

        // Cursor advanced past the consumed batch
        assert!(tuner.tick().await.unwrap().is_none());
    }
}
