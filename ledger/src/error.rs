//! Error types for ledger operations.

use crate::types::ContractStatus;

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed request, rejected before any state change
    #[error("Invalid ledger request: {0}")]
    Validation(String),

    /// Unknown contract
    #[error("Contract not found: {0}")]
    NotFound(String),

    /// Contract is not in a state that permits the operation
    #[error("Contract {contract_id} is {status}, cannot {operation}")]
    StateConflict {
        contract_id: String,
        status: ContractStatus,
        operation: &'static str,
    },

    /// Settlement backend failed or timed out
    #[error("Settlement backend error: {0}")]
    External(String),

    /// Replayed entries do not form a valid history
    #[error("Corrupt ledger history: {0}")]
    Corrupt(String),

    /// IO error on the persisted log
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error on the persisted log
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    /// Whether retrying the call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::External(_))
    }

    pub fn is_state_conflict(&self) -> bool {
        matches!(self, Self::StateConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_external_errors_are_transient() {
        assert!(LedgerError::External("timeout".into()).is_transient());
        assert!(!LedgerError::NotFound("c-1".into()).is_transient());
        assert!(!LedgerError::StateConflict {
            contract_id: "c-1".into(),
            status: ContractStatus::Paid,
            operation: "release_payment",
        }
        .is_transient());
    }

    #[test]
    fn test_state_conflict_message() {
        let err = LedgerError::StateConflict {
            contract_id: "c-1".into(),
            status: ContractStatus::Created,
            operation: "release_payment",
        };
        assert_eq!(
            err.to_string(),
            "Contract c-1 is created, cannot release_payment"
        );
    }
}
