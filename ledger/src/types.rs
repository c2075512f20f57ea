//! Core types for the escrow ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LedgerError;

/// Monetary amount in the ledger's smallest unit.
pub type Amount = u64;

/// Basis points in a whole (100%).
pub const BASIS_POINTS_TOTAL: u16 = 10_000;

/// Contract status.
///
/// Transitions are monotonic: `created → completed → paid`, or
/// `created/completed → disputed → paid`. `paid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Escrow funded, work in progress
    Created,
    /// Work accepted, funds releasable
    Completed,
    /// Under dispute, funds frozen until resolution
    Disputed,
    /// Funds released (terminal)
    Paid,
}

impl ContractStatus {
    pub fn allowed_transitions(&self) -> &'static [ContractStatus] {
        use ContractStatus::*;
        match self {
            Created => &[Completed, Disputed],
            Completed => &[Paid, Disputed],
            Disputed => &[Paid],
            Paid => &[],
        }
    }

    pub fn can_transition_to(&self, target: ContractStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Create,
    Complete,
    Release,
    Dispute,
    Resolve,
}

impl EntryType {
    /// Status the contract holds after this entry is applied.
    pub fn resulting_status(&self) -> ContractStatus {
        match self {
            Self::Create => ContractStatus::Created,
            Self::Complete => ContractStatus::Completed,
            Self::Release | Self::Resolve => ContractStatus::Paid,
            Self::Dispute => ContractStatus::Disputed,
        }
    }

    /// Statuses from which this entry may be applied.
    ///
    /// `Create` applies only to a contract that does not exist yet.
    pub fn required_statuses(&self) -> &'static [ContractStatus] {
        use ContractStatus::*;
        match self {
            Self::Create => &[],
            Self::Complete => &[Created],
            Self::Release => &[Completed],
            Self::Dispute => &[Created, Completed],
            Self::Resolve => &[Disputed],
        }
    }

    /// Whether this entry moves escrowed funds out of the ledger.
    pub fn releases_funds(&self) -> bool {
        matches!(self, Self::Release | Self::Resolve)
    }

    /// Settlement operation name, used in logs and errors.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Create => "create_escrow",
            Self::Complete => "complete_job",
            Self::Release => "release_payment",
            Self::Dispute => "create_dispute",
            Self::Resolve => "resolve_dispute",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// Parties bound by a contract, recorded on its `create` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParties {
    pub job_id: String,
    pub requester_id: String,
    pub provider_id: String,
}

/// Split of escrowed funds between requester and provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Amount returned to the requester
    pub requester: Amount,
    /// Amount paid to the provider
    pub provider: Amount,
    /// Requester share used for the split
    pub requester_share_bps: u16,
}

impl Payout {
    /// Pay the full amount to the provider.
    pub fn to_provider(amount: Amount) -> Self {
        Self {
            requester: 0,
            provider: amount,
            requester_share_bps: 0,
        }
    }

    /// Split `amount` by a requester share in basis points.
    ///
    /// The requester part is rounded down; the provider receives the
    /// remainder, so the two parts always sum to `amount`.
    pub fn split(amount: Amount, requester_share_bps: u16) -> Result<Self, LedgerError> {
        if requester_share_bps > BASIS_POINTS_TOTAL {
            return Err(LedgerError::Validation(format!(
                "requester share {} bps exceeds {}",
                requester_share_bps, BASIS_POINTS_TOTAL
            )));
        }

        let requester =
            (amount as u128 * requester_share_bps as u128 / BASIS_POINTS_TOTAL as u128) as Amount;

        Ok(Self {
            requester,
            provider: amount - requester,
            requester_share_bps,
        })
    }

    pub fn total(&self) -> Amount {
        self.requester + self.provider
    }
}

/// One append-only ledger record.
///
/// Persisted as one JSON line: `{seq, type, contract_id, amount, timestamp, tx_ref, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Journal-wide sequence number (orders entries with equal timestamps)
    pub seq: u64,
    /// Entry type
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Contract this entry applies to
    pub contract_id: String,
    /// Escrowed amount for `create`, released amount for `release`/`resolve`, zero otherwise
    pub amount: Amount,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Transaction reference returned to the caller
    pub tx_ref: String,
    /// Contract parties (`create` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parties: Option<ContractParties>,
    /// Fund split (`release` and `resolve` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<Payout>,
}

/// Current view of a contract, derived from its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: String,
    pub job_id: String,
    pub requester_id: String,
    pub provider_id: String,
    /// Agreed price, held in escrow
    pub agreed_price: Amount,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Total released across the contract's lifetime
    pub released: Amount,
    /// Final split once paid
    pub payout: Option<Payout>,
    /// Reference of the most recent transaction
    pub last_tx_ref: String,
}

/// Request to open an escrow for a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRequest {
    pub contract_id: String,
    pub job_id: String,
    pub requester_id: String,
    pub provider_id: String,
    pub amount: Amount,
}

impl EscrowRequest {
    pub fn new(
        contract_id: impl Into<String>,
        job_id: impl Into<String>,
        requester_id: impl Into<String>,
        provider_id: impl Into<String>,
        amount: Amount,
    ) -> Self {
        Self {
            contract_id: contract_id.into(),
            job_id: job_id.into(),
            requester_id: requester_id.into(),
            provider_id: provider_id.into(),
            amount,
        }
    }

    /// Reject malformed requests before any state change.
    pub fn validate(&self) -> Result<(), LedgerError> {
        for (field, value) in [
            ("contract_id", &self.contract_id),
            ("job_id", &self.job_id),
            ("requester_id", &self.requester_id),
            ("provider_id", &self.provider_id),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::Validation(format!("{} is required", field)));
            }
        }
        if self.amount == 0 {
            return Err(LedgerError::Validation(
                "escrow amount must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn parties(&self) -> ContractParties {
        ContractParties {
            job_id: self.job_id.clone(),
            requester_id: self.requester_id.clone(),
            provider_id: self.provider_id.clone(),
        }
    }
}

/// Opaque transaction reference.
///
/// Synthesized by the local simulation; a real transaction hash for the
/// settlement chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(pub String);

impl TxRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<LedgerEntry> for TxRef {
    fn from(entry: LedgerEntry) -> Self {
        TxRef(entry.tx_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_monotonic() {
        assert!(ContractStatus::Created.can_transition_to(ContractStatus::Completed));
        assert!(ContractStatus::Completed.can_transition_to(ContractStatus::Disputed));
        assert!(!ContractStatus::Completed.can_transition_to(ContractStatus::Created));
        assert!(!ContractStatus::Disputed.can_transition_to(ContractStatus::Completed));
        assert!(ContractStatus::Paid.allowed_transitions().is_empty());
        assert!(ContractStatus::Paid.is_terminal());
    }

    #[test]
    fn test_entry_types_match_status_rules() {
        for entry_type in [
            EntryType::Complete,
            EntryType::Release,
            EntryType::Dispute,
            EntryType::Resolve,
        ] {
            for from in entry_type.required_statuses() {
                assert!(from.can_transition_to(entry_type.resulting_status()));
            }
        }
    }

    #[test]
    fn test_payout_split() {
        let payout = Payout::split(500, 3000).unwrap();
        assert_eq!(payout.requester, 150);
        assert_eq!(payout.provider, 350);

        // Remainder goes to the provider
        let payout = Payout::split(333, 5000).unwrap();
        assert_eq!(payout.requester, 166);
        assert_eq!(payout.provider, 167);
        assert_eq!(payout.total(), 333);

        assert!(Payout::split(500, 10_001).is_err());
    }

    #[test]
    fn test_escrow_request_validation() {
        assert!(EscrowRequest::new("c", "j", "r", "p", 10).validate().is_ok());
        assert!(EscrowRequest::new("c", "j", "r", "p", 0).validate().is_err());
        assert!(EscrowRequest::new("c", " ", "r", "p", 10).validate().is_err());
    }

    #[test]
    fn test_entry_serializes_type_field() {
        let entry = LedgerEntry {
            seq: 1,
            entry_type: EntryType::Create,
            contract_id: "c-1".to_string(),
            amount: 500,
            timestamp: Utc::now(),
            tx_ref: "0xabc".to_string(),
            parties: None,
            payout: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "create");
        assert_eq!(json["amount"], 500);
        assert!(json.get("payout").is_none());
    }
}
