//! Error types for the marketplace engine.

use ledger::LedgerError;
use market_agent::{AgentError, PaymentError};

use crate::job::JobState;

/// Error types for the marketplace engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed input, rejected before any state change
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Unknown job, candidate or contract
    #[error("Not found: {0}")]
    NotFound(String),

    /// Event not applicable to the job's current state
    #[error("Job {job_id} is {state}, cannot {event}")]
    StateConflict {
        job_id: String,
        state: JobState,
        event: &'static str,
    },

    /// Job is waiting for manual intervention
    #[error("Job {job_id} stalled on {step}: {reason}")]
    Stalled {
        job_id: String,
        step: String,
        reason: String,
    },

    /// Matching, negotiation or quality component error
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Payment Controller error
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Ledger error outside the Payment Controller
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML configuration could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    /// Whether retrying the call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Agent(e) => e.is_transient(),
            Self::Ledger(e) => e.is_transient(),
            Self::Payment(PaymentError::Ledger(e)) => e.is_transient(),
            _ => false,
        }
    }

    pub fn is_state_conflict(&self) -> bool {
        match self {
            Self::StateConflict { .. } => true,
            Self::Payment(e) => e.is_state_conflict(),
            Self::Ledger(e) => e.is_state_conflict(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Agent(AgentError::NotFound(_))
                | Self::Ledger(LedgerError::NotFound(_))
                | Self::Payment(PaymentError::Ledger(LedgerError::NotFound(_)))
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Agent(AgentError::Validation(_))
                | Self::Agent(AgentError::DimensionMismatch { .. })
                | Self::Ledger(LedgerError::Validation(_))
                | Self::Payment(PaymentError::Ledger(LedgerError::Validation(_)))
        )
    }

    /// A ledger call that stayed unreachable through every retry.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Payment(e) if e.is_exhausted())
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(EngineError::from(AgentError::ExternalService("down".into())).is_transient());
        assert!(EngineError::from(AgentError::DimensionMismatch { expected: 2, got: 3 }).is_validation());
        assert!(EngineError::from(LedgerError::NotFound("c-1".into())).is_not_found());

        let conflict = EngineError::StateConflict {
            job_id: "job-1".into(),
            state: JobState::Posted,
            event: "submit",
        };
        assert!(conflict.is_state_conflict());
        assert_eq!(conflict.to_string(), "Job job-1 is posted, cannot submit");
    }
}
