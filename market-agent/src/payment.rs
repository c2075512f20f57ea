//! Payment Controller.
//!
//! Job-aware wrapper over a [`LedgerBackend`]: one contract per job, escrow
//! equal to the agreed price, and dispute resolution with a default share.
//! Transient ledger failures are retried with bounded backoff; a call that
//! keeps failing surfaces as [`PaymentError::Exhausted`] so the caller can
//! stall the job instead of failing it.

use ledger::{Amount, Contract, EscrowRequest, LedgerBackend, LedgerEntry, LedgerError, TxRef};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::PaymentConfig;
use crate::retry::{RetryError, RetryPolicy};
use crate::types::JobSpec;

/// Payment errors.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The ledger rejected the call
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The ledger stayed unreachable through every retry
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        source: LedgerError,
    },
}

impl PaymentError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn is_state_conflict(&self) -> bool {
        matches!(self, Self::Ledger(e) if e.is_state_conflict())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::NotFound(_)))
    }

    fn from_retry(operation: &'static str, err: RetryError<LedgerError>) -> Self {
        if err.is_exhausted() {
            error!(operation, attempts = err.attempts, error = %err.error, "Ledger retries exhausted");
            Self::Exhausted {
                operation,
                attempts: err.attempts,
                source: err.error,
            }
        } else {
            Self::Ledger(err.error)
        }
    }
}

pub type PaymentResult<T> = std::result::Result<T, PaymentError>;

/// Job-aware escrow operations.
pub struct PaymentController {
    ledger: Arc<dyn LedgerBackend>,
    retry: RetryPolicy,
    default_share_bps: u16,
}

impl PaymentController {
    pub fn new(config: PaymentConfig, ledger: Arc<dyn LedgerBackend>) -> Self {
        Self {
            ledger,
            retry: RetryPolicy::new(config.retry),
            default_share_bps: config.default_requester_share_bps,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerBackend> {
        &self.ledger
    }

    /// Contract id of a job's single contract.
    pub fn contract_id_for(job_id: &str) -> String {
        format!("contract-{}", job_id)
    }

    /// Fund escrow for the agreed price.
    pub async fn open_escrow(
        &self,
        job: &JobSpec,
        provider_id: &str,
        price: Amount,
    ) -> PaymentResult<TxRef> {
        let request = EscrowRequest::new(
            Self::contract_id_for(&job.id),
            &job.id,
            &job.requester_id,
            provider_id,
            price,
        );
        request.validate()?;

        let tx = self
            .retry
            .run("create_escrow", || self.ledger.create_escrow(request.clone()))
            .await
            .map_err(|e| PaymentError::from_retry("create_escrow", e))?;

        info!(
            job_id = %job.id,
            contract_id = %request.contract_id,
            provider_id,
            amount = price,
            tx_ref = %tx,
            "Escrow opened"
        );
        Ok(tx)
    }

    /// Mark the contract's work as accepted.
    pub async fn complete(&self, contract_id: &str) -> PaymentResult<TxRef> {
        self.retry
            .run("complete_job", || self.ledger.complete_job(contract_id))
            .await
            .map_err(|e| PaymentError::from_retry("complete_job", e))
    }

    /// Release escrow to the provider. Succeeds at most once per contract.
    pub async fn release(&self, contract_id: &str) -> PaymentResult<TxRef> {
        let tx = self
            .retry
            .run("release_payment", || self.ledger.release_payment(contract_id))
            .await
            .map_err(|e| PaymentError::from_retry("release_payment", e))?;
        info!(contract_id, tx_ref = %tx, "Payment released");
        Ok(tx)
    }

    pub async fn dispute(&self, contract_id: &str) -> PaymentResult<TxRef> {
        let tx = self
            .retry
            .run("create_dispute", || self.ledger.create_dispute(contract_id))
            .await
            .map_err(|e| PaymentError::from_retry("create_dispute", e))?;
        info!(contract_id, tx_ref = %tx, "Dispute opened");
        Ok(tx)
    }

    /// Split escrow; `None` applies the configured default share.
    pub async fn resolve(
        &self,
        contract_id: &str,
        requester_share_bps: Option<u16>,
    ) -> PaymentResult<TxRef> {
        let share = requester_share_bps.unwrap_or(self.default_share_bps);
        let tx = self
            .retry
            .run("resolve_dispute", || self.ledger.resolve_dispute(contract_id, share))
            .await
            .map_err(|e| PaymentError::from_retry("resolve_dispute", e))?;
        info!(contract_id, requester_share_bps = share, tx_ref = %tx, "Dispute resolved");
        Ok(tx)
    }

    pub async fn status(&self, contract_id: &str) -> PaymentResult<Contract> {
        self.retry
            .run("get_contract", || self.ledger.get_contract(contract_id))
            .await
            .map_err(|e| PaymentError::from_retry("get_contract", e))
    }

    pub async fn entries(&self, contract_id: &str) -> PaymentResult<Vec<LedgerEntry>> {
        self.retry
            .run("entries", || self.ledger.entries(contract_id))
            .await
            .map_err(|e| PaymentError::from_retry("entries", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use async_trait::async_trait;
    use chrono::Utc;
    use ledger::{ContractStatus, EntryType, LedgerOp, LocalLedger};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Local ledger whose first `failures` submits fail transiently.
    struct FlakyLedger {
        inner: LocalLedger,
        failures: AtomicU32,
    }

    #[async_trait]
    impl LedgerBackend for FlakyLedger {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn submit(&self, contract_id: &str, op: LedgerOp) -> Result<LedgerEntry, LedgerError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LedgerError::External("gateway timeout".to_string()));
            }
            self.inner.submit(contract_id, op).await
        }

        async fn get_contract(&self, contract_id: &str) -> Result<Contract, LedgerError> {
            self.inner.get_contract(contract_id).await
        }

        async fn entries(&self, contract_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
            self.inner.entries(contract_id).await
        }
    }

    fn fast_config() -> PaymentConfig {
        PaymentConfig {
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 1,
                multiplier: 1.0,
                max_delay_ms: 1,
            },
            ..Default::default()
        }
    }

    fn job() -> JobSpec {
        JobSpec {
            id: "job-1".to_string(),
            requester_id: "req-1".to_string(),
            title: "Build an API".to_string(),
            skills: vec!["rust".to_string()],
            budget_min: 400,
            budget_max: 600,
            deadline: Utc::now(),
            requirement_embedding: None,
        }
    }

    fn flaky(failures: u32) -> PaymentController {
        PaymentController::new(
            fast_config(),
            Arc::new(FlakyLedger {
                inner: LocalLedger::new(),
                failures: AtomicU32::new(failures),
            }),
        )
    }

    #[tokio::test]
    async fn test_escrow_complete_release() {
        let payments = PaymentController::new(fast_config(), Arc::new(LocalLedger::new()));
        let contract_id = PaymentController::contract_id_for("job-1");

        payments.open_escrow(&job(), "prov-1", 575).await.unwrap();
        payments.complete(&contract_id).await.unwrap();
        payments.release(&contract_id).await.unwrap();

        let contract = payments.status(&contract_id).await.unwrap();
        assert_eq!(contract.status, ContractStatus::Paid);
        assert_eq!(contract.agreed_price, 575);
        assert_eq!(contract.released, 575);

        let err = payments.release(&contract_id).await.unwrap_err();
        assert!(err.is_state_conflict());
        let releases = payments
            .entries(&contract_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.entry_type == EntryType::Release)
            .count();
        assert_eq!(releases, 1);
    }

    #[tokio::test]
    async fn test_resolve_uses_default_share() {
        let payments = PaymentController::new(fast_config(), Arc::new(LocalLedger::new()));
        let contract_id = PaymentController::contract_id_for("job-1");

        payments.open_escrow(&job(), "prov-1", 500).await.unwrap();
        payments.dispute(&contract_id).await.unwrap();
        payments.resolve(&contract_id, None).await.unwrap();

        let payout = payments.status(&contract_id).await.unwrap().payout.unwrap();
        assert_eq!(payout.requester, 250);
        assert_eq!(payout.provider, 250);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let payments = flaky(2);
        payments.open_escrow(&job(), "prov-1", 500).await.unwrap();

        let contract = payments.status("contract-job-1").await.unwrap();
        assert_eq!(contract.status, ContractStatus::Created);
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let payments = flaky(5);
        let err = payments.open_escrow(&job(), "prov-1", 500).await.unwrap_err();

        assert!(err.is_exhausted());
        match err {
            PaymentError::Exhausted { attempts, operation, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(operation, "create_escrow");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(payments.status("contract-job-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_escrow_not_retried() {
        let payments = flaky(0);
        let err = payments.open_escrow(&job(), "prov-1", 0).await.unwrap_err();
        assert!(matches!(err, PaymentError::Ledger(LedgerError::Validation(_))));
    }
}
