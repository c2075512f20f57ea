//! Shared append-only journal.
//!
//! Both backends record through a [`Journal`]. It owns the per-contract
//! exclusive sections, so two state-changing calls on the same contract never
//! interleave, while calls on different contracts proceed in parallel.

use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::LedgerOp;
use crate::error::LedgerError;
use crate::fold::{check_transition, fold, fold_contract};
use crate::log::JsonLinesLog;
use crate::types::{Contract, LedgerEntry, Payout};

/// Append-only journal of ledger entries.
pub struct Journal {
    /// Entries per contract, in append order
    entries: DashMap<String, Vec<LedgerEntry>>,
    /// Per-contract exclusive sections
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Next sequence number
    next_seq: AtomicU64,
    /// Optional persisted log
    sink: Option<JsonLinesLog<LedgerEntry>>,
}

impl Journal {
    /// Create an in-memory journal.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            locks: DashMap::new(),
            next_seq: AtomicU64::new(1),
            sink: None,
        }
    }

    /// Create a journal from existing entries.
    ///
    /// The history is validated by folding it; an invalid history is rejected.
    pub fn restore(entries: Vec<LedgerEntry>) -> Result<Self, LedgerError> {
        fold(entries.iter())?;

        let journal = Self::new();
        let mut max_seq = 0;
        for entry in entries {
            max_seq = max_seq.max(entry.seq);
            journal
                .entries
                .entry(entry.contract_id.clone())
                .or_default()
                .push(entry);
        }
        for mut contract_entries in journal.entries.iter_mut() {
            contract_entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        }
        journal.next_seq.store(max_seq + 1, Ordering::SeqCst);
        Ok(journal)
    }

    /// Open a journal backed by a JSON-lines log, replaying what it already holds.
    pub async fn persistent(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let existing: Vec<LedgerEntry> = JsonLinesLog::read_all(path.as_ref()).await?;
        let replayed = existing.len();

        let mut journal = Self::restore(existing)?;
        journal.sink = Some(JsonLinesLog::open(path.as_ref()).await?);

        info!(
            path = %path.as_ref().display(),
            entries = replayed,
            "Ledger journal replayed"
        );
        Ok(journal)
    }

    /// Current view of a contract.
    pub fn view(&self, contract_id: &str) -> Result<Option<Contract>, LedgerError> {
        match self.entries.get(contract_id) {
            Some(entries) => fold_contract(contract_id, &entries),
            None => Ok(None),
        }
    }

    /// Entries of one contract.
    pub fn entries(&self, contract_id: &str) -> Vec<LedgerEntry> {
        self.entries
            .get(contract_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Every entry, in `(timestamp, seq)` order.
    pub fn all_entries(&self) -> Vec<LedgerEntry> {
        let mut all: Vec<LedgerEntry> = self
            .entries
            .iter()
            .flat_map(|entries| entries.value().clone())
            .collect();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        all
    }

    /// Number of contracts with at least one entry.
    pub fn contract_count(&self) -> usize {
        self.entries.len()
    }

    /// Apply `op` to a contract inside its exclusive section.
    ///
    /// The transition is checked against the folded view, the draft entry is
    /// handed to `settle` (which returns the transaction reference), and only
    /// if settlement succeeds is the entry appended.
    ///
    /// A settled entry that cannot be persisted is not recorded and surfaces
    /// as a transient error, so the caller retries and the backend settles
    /// the same transition again.
    pub async fn transact<F, Fut>(
        &self,
        contract_id: &str,
        op: LedgerOp,
        settle: F,
    ) -> Result<LedgerEntry, LedgerError>
    where
        F: FnOnce(LedgerEntry, Option<Contract>) -> Fut + Send,
        Fut: Future<Output = Result<String, LedgerError>> + Send,
    {
        let lock = self.lock_for(contract_id);
        let _guard = lock.lock().await;

        let current = self.view(contract_id)?;
        let entry_type = op.entry_type();

        if let Err(e) = check_transition(contract_id, current.as_ref(), entry_type) {
            warn!(
                contract_id = %contract_id,
                operation = entry_type.operation(),
                error = %e,
                "Ledger operation rejected"
            );
            return Err(e);
        }

        let draft = self.draft(contract_id, &op, current.as_ref())?;
        let tx_ref = settle(draft.clone(), current).await?;
        let entry = LedgerEntry { tx_ref, ..draft };

        if let Err(e) = self.commit(entry.clone()).await {
            error!(
                contract_id = %contract_id,
                operation = entry_type.operation(),
                tx_ref = %entry.tx_ref,
                error = %e,
                "Settled entry could not be persisted"
            );
            return Err(LedgerError::External(format!(
                "entry {} settled as {} but not persisted: {}",
                entry.seq, entry.tx_ref, e
            )));
        }

        info!(
            contract_id = %contract_id,
            operation = entry_type.operation(),
            seq = entry.seq,
            amount = entry.amount,
            tx_ref = %entry.tx_ref,
            "Ledger entry appended"
        );

        Ok(entry)
    }

    fn lock_for(&self, contract_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(contract_id.to_string())
                .or_default()
                .value(),
        )
    }

    fn draft(
        &self,
        contract_id: &str,
        op: &LedgerOp,
        current: Option<&Contract>,
    ) -> Result<LedgerEntry, LedgerError> {
        let remaining = current.map(|c| c.agreed_price - c.released).unwrap_or(0);

        let (amount, parties, payout) = match op {
            LedgerOp::CreateEscrow(request) => {
                if request.contract_id != contract_id {
                    return Err(LedgerError::Validation(format!(
                        "escrow request for {} submitted against {}",
                        request.contract_id, contract_id
                    )));
                }
                (request.amount, Some(request.parties()), None)
            }
            LedgerOp::CompleteJob | LedgerOp::CreateDispute => (0, None, None),
            LedgerOp::ReleasePayment => (remaining, None, Some(Payout::to_provider(remaining))),
            LedgerOp::ResolveDispute {
                requester_share_bps,
            } => (
                remaining,
                None,
                Some(Payout::split(remaining, *requester_share_bps)?),
            ),
        };

        // Keep timestamps non-decreasing within a contract
        let now = Utc::now();
        let timestamp = match current {
            Some(contract) if contract.updated_at > now => contract.updated_at,
            _ => now,
        };

        Ok(LedgerEntry {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            entry_type: op.entry_type(),
            contract_id: contract_id.to_string(),
            amount,
            timestamp,
            tx_ref: String::new(),
            parties,
            payout,
        })
    }

    async fn commit(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        if let Some(sink) = &self.sink {
            sink.append(&entry).await?;
            debug!(path = %sink.path().display(), seq = entry.seq, "Entry persisted");
        }
        self.entries
            .entry(entry.contract_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}
