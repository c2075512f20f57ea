//! Core trait for ledger backends.
//!
//! This module defines the `LedgerBackend` trait - the settlement interface
//! shared by the local simulation and the external settlement chain.
//! Both backends enforce the same state rules, so the orchestrator cannot
//! tell them apart.

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::{Contract, EntryType, EscrowRequest, LedgerEntry, TxRef};

/// A state-changing ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    /// Open escrow for a new contract
    CreateEscrow(EscrowRequest),
    /// Mark the contract's work as accepted
    CompleteJob,
    /// Release escrow to the provider
    ReleasePayment,
    /// Freeze escrow pending resolution
    CreateDispute,
    /// Split escrow between requester and provider
    ResolveDispute { requester_share_bps: u16 },
}

impl LedgerOp {
    /// Entry type this operation appends.
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::CreateEscrow(_) => EntryType::Create,
            Self::CompleteJob => EntryType::Complete,
            Self::ReleasePayment => EntryType::Release,
            Self::CreateDispute => EntryType::Dispute,
            Self::ResolveDispute { .. } => EntryType::Resolve,
        }
    }
}

/// Core trait for ledger backends.
///
/// Every successful state-changing call appends exactly one [`LedgerEntry`]
/// before returning. Calls are not idempotent: repeating a successful call
/// fails with [`LedgerError::StateConflict`] instead of re-applying it.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Backend identifier (e.g. "local", "chain").
    fn id(&self) -> &str;

    /// Apply an operation to a contract under its exclusive section.
    async fn submit(&self, contract_id: &str, op: LedgerOp) -> Result<LedgerEntry, LedgerError>;

    /// Current view of a contract, folded from its entries.
    async fn get_contract(&self, contract_id: &str) -> Result<Contract, LedgerError>;

    /// The contract's entries in application order.
    async fn entries(&self, contract_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Check if the backend is reachable.
    async fn is_available(&self) -> bool {
        true
    }

    async fn create_escrow(&self, request: EscrowRequest) -> Result<TxRef, LedgerError> {
        request.validate()?;
        let contract_id = request.contract_id.clone();
        self.submit(&contract_id, LedgerOp::CreateEscrow(request))
            .await
            .map(TxRef::from)
    }

    async fn complete_job(&self, contract_id: &str) -> Result<TxRef, LedgerError> {
        self.submit(contract_id, LedgerOp::CompleteJob)
            .await
            .map(TxRef::from)
    }

    async fn release_payment(&self, contract_id: &str) -> Result<TxRef, LedgerError> {
        self.submit(contract_id, LedgerOp::ReleasePayment)
            .await
            .map(TxRef::from)
    }

    async fn create_dispute(&self, contract_id: &str) -> Result<TxRef, LedgerError> {
        self.submit(contract_id, LedgerOp::CreateDispute)
            .await
            .map(TxRef::from)
    }

    async fn resolve_dispute(
        &self,
        contract_id: &str,
        requester_share_bps: u16,
    ) -> Result<TxRef, LedgerError> {
        self.submit(
            contract_id,
            LedgerOp::ResolveDispute {
                requester_share_bps,
            },
        )
        .await
        .map(TxRef::from)
    }
}
