//! Performance metrics over all jobs.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobState};

/// Aggregate job statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceMetrics {
    pub total_jobs: usize,
    /// Jobs for which matching ever produced a candidate
    pub matched_jobs: usize,
    pub match_rate: f64,
    /// Jobs that ended in `completed_paid`
    pub completed_jobs: usize,
    pub completion_rate: f64,
    /// Mean quality similarity over reviewed jobs
    pub average_qa_score: Option<f64>,
    /// Jobs not yet in a terminal state
    pub active_jobs: usize,
    pub stalled_jobs: usize,
}

impl PerformanceMetrics {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let total_jobs = jobs.len();
        let matched_jobs = jobs.iter().filter(|j| j.ever_matched).count();
        let completed_jobs = jobs
            .iter()
            .filter(|j| j.state == JobState::CompletedPaid)
            .count();
        let scores: Vec<f64> = jobs
            .iter()
            .filter_map(|j| j.quality.as_ref().map(|q| q.similarity))
            .collect();

        let rate = |count: usize| {
            if total_jobs == 0 {
                0.0
            } else {
                count as f64 / total_jobs as f64
            }
        };

        Self {
            total_jobs,
            matched_jobs,
            match_rate: rate(matched_jobs),
            completed_jobs,
            completion_rate: rate(completed_jobs),
            average_qa_score: if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<f64>() / scores.len() as f64)
            },
            active_jobs: jobs.iter().filter(|j| !j.state.is_terminal()).count(),
            stalled_jobs: jobs.iter().filter(|j| j.is_stalled()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let metrics = PerformanceMetrics::from_jobs(&[]);
        assert_eq!(metrics.total_jobs, 0);
        assert_eq!(metrics.match_rate, 0.0);
        assert_eq!(metrics.average_qa_score, None);
    }
}
