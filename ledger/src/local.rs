//! In-process settlement simulation.
//!
//! Settles every transition immediately and synthesizes a transaction
//! reference from the entry's content.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::backend::{LedgerBackend, LedgerOp};
use crate::error::LedgerError;
use crate::journal::Journal;
use crate::types::{Contract, LedgerEntry};

/// Local ledger backend.
pub struct LocalLedger {
    journal: Journal,
}

impl LocalLedger {
    /// In-memory ledger; nothing is persisted.
    pub fn new() -> Self {
        Self {
            journal: Journal::new(),
        }
    }

    /// Ledger persisted to a JSON-lines file, replaying existing entries.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Ok(Self {
            journal: Journal::persistent(path).await?,
        })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Synthesize a transaction reference: `0x` + hex SHA-256 of the entry content.
fn synthesize_tx_ref(entry: &LedgerEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.seq.to_be_bytes());
    hasher.update(entry.entry_type.operation().as_bytes());
    hasher.update(entry.contract_id.as_bytes());
    hasher.update(entry.amount.to_be_bytes());
    hasher.update(entry.timestamp.to_rfc3339().as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl LedgerBackend for LocalLedger {
    fn id(&self) -> &str {
        "local"
    }

    async fn submit(&self, contract_id: &str, op: LedgerOp) -> Result<LedgerEntry, LedgerError> {
        self.journal
            .transact(contract_id, op, |entry, _| async move {
                Ok(synthesize_tx_ref(&entry))
            })
            .await
    }

    async fn get_contract(&self, contract_id: &str) -> Result<Contract, LedgerError> {
        self.journal
            .view(contract_id)?
            .ok_or_else(|| LedgerError::NotFound(contract_id.to_string()))
    }

    async fn entries(&self, contract_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.journal.entries(contract_id);
        if entries.is_empty() {
            return Err(LedgerError::NotFound(contract_id.to_string()));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::replay;
    use crate::types::{ContractStatus, EntryType, EscrowRequest};
    use std::sync::Arc;

    fn escrow(contract_id: &str, amount: u64) -> EscrowRequest {
        EscrowRequest::new(contract_id, "job-1", "req-1", "prov-1", amount)
    }

    #[tokio::test]
    async fn test_happy_path_to_paid() {
        let ledger = LocalLedger::new();

        let tx = ledger.create_escrow(escrow("c-1", 575)).await.unwrap();
        assert!(tx.as_str().starts_with("0x"));
        assert_eq!(tx.as_str().len(), 66);

        ledger.complete_job("c-1").await.unwrap();
        ledger.release_payment("c-1").await.unwrap();

        let contract = ledger.get_contract("c-1").await.unwrap();
        assert_eq!(contract.status, ContractStatus::Paid);
        assert_eq!(contract.released, 575);
        assert_eq!(contract.payout.unwrap().provider, 575);

        let types: Vec<EntryType> = ledger
            .entries("c-1")
            .await
            .unwrap()
            .iter()
            .map(|e| e.entry_type)
            .collect();
        assert_eq!(
            types,
            vec![EntryType::Create, EntryType::Complete, EntryType::Release]
        );
    }

    #[tokio::test]
    async fn test_release_requires_completion() {
        let ledger = LocalLedger::new();
        ledger.create_escrow(escrow("c-1", 500)).await.unwrap();

        let err = ledger.release_payment("c-1").await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::StateConflict {
                status: ContractStatus::Created,
                ..
            }
        ));
        assert_eq!(ledger.entries("c-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_release_conflicts() {
        let ledger = LocalLedger::new();
        ledger.create_escrow(escrow("c-1", 500)).await.unwrap();
        ledger.complete_job("c-1").await.unwrap();
        ledger.release_payment("c-1").await.unwrap();

        let err = ledger.release_payment("c-1").await.unwrap_err();
        assert!(err.is_state_conflict());

        let releases = ledger
            .entries("c-1")
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.entry_type == EntryType::Release)
            .count();
        assert_eq!(releases, 1);
    }

    #[tokio::test]
    async fn test_duplicate_escrow_conflicts() {
        let ledger = LocalLedger::new();
        ledger.create_escrow(escrow("c-1", 500)).await.unwrap();
        assert!(ledger
            .create_escrow(escrow("c-1", 500))
            .await
            .unwrap_err()
            .is_state_conflict());
    }

    #[tokio::test]
    async fn test_unknown_contract_is_not_found() {
        let ledger = LocalLedger::new();
        assert!(matches!(
            ledger.complete_job("missing").await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.get_contract("missing").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_escrow_leaves_no_entry() {
        let ledger = LocalLedger::new();
        assert!(matches!(
            ledger.create_escrow(escrow("c-1", 0)).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(ledger.journal().entries("c-1").is_empty());
    }

    #[tokio::test]
    async fn test_dispute_resolution_splits_remaining_escrow() {
        let ledger = LocalLedger::new();
        ledger.create_escrow(escrow("c-1", 500)).await.unwrap();
        ledger.create_dispute("c-1").await.unwrap();
        ledger.resolve_dispute("c-1", 3000).await.unwrap();

        let contract = ledger.get_contract("c-1").await.unwrap();
        assert_eq!(contract.status, ContractStatus::Paid);
        let payout = contract.payout.unwrap();
        assert_eq!(payout.requester, 150);
        assert_eq!(payout.provider, 350);
        assert_eq!(contract.released, 500);
    }

    #[tokio::test]
    async fn test_resolve_rejects_share_over_whole() {
        let ledger = LocalLedger::new();
        ledger.create_escrow(escrow("c-1", 500)).await.unwrap();
        ledger.create_dispute("c-1").await.unwrap();

        assert!(matches!(
            ledger.resolve_dispute("c-1", 10_001).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(
            ledger.get_contract("c-1").await.unwrap().status,
            ContractStatus::Disputed
        );
    }

    #[tokio::test]
    async fn test_concurrent_releases_settle_once() {
        let ledger = Arc::new(LocalLedger::new());
        ledger.create_escrow(escrow("c-1", 900)).await.unwrap();
        ledger.complete_job("c-1").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(
                async move { ledger.release_payment("c-1").await },
            ));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert!(e.is_state_conflict()),
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(ledger.get_contract("c-1").await.unwrap().released, 900);
    }

    #[tokio::test]
    async fn test_released_never_exceeds_escrow() {
        let ledger = LocalLedger::new();
        for (i, amount) in [1u64, 7, 333, 10_000].into_iter().enumerate() {
            let id = format!("c-{}", i);
            ledger.create_escrow(escrow(&id, amount)).await.unwrap();
            if i % 2 == 0 {
                ledger.complete_job(&id).await.unwrap();
                ledger.release_payment(&id).await.unwrap();
            } else {
                ledger.create_dispute(&id).await.unwrap();
                ledger.resolve_dispute(&id, 3333).await.unwrap();
            }

            let released: u64 = ledger
                .entries(&id)
                .await
                .unwrap()
                .iter()
                .filter(|e| e.entry_type.releases_funds())
                .map(|e| e.amount)
                .sum();
            assert_eq!(released, amount);
        }
    }

    #[tokio::test]
    async fn test_persisted_ledger_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let ledger = LocalLedger::open(&path).await.unwrap();
            ledger.create_escrow(escrow("c-1", 500)).await.unwrap();
            ledger.complete_job("c-1").await.unwrap();
        }

        let contracts = replay(&path).await.unwrap();
        assert_eq!(contracts["c-1"].status, ContractStatus::Completed);

        let reopened = LocalLedger::open(&path).await.unwrap();
        reopened.release_payment("c-1").await.unwrap();
        assert_eq!(
            reopened.get_contract("c-1").await.unwrap().status,
            ContractStatus::Paid
        );
        assert_eq!(replay(&path).await.unwrap()["c-1"].status, ContractStatus::Paid);
    }
}
