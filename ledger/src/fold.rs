//! Deriving contract views from ledger entries.
//!
//! Entries are folded in `(timestamp, seq)` order. Stored entries are never
//! mutated; a contract's status is whatever its history folds to.

use std::collections::HashMap;
use std::path::Path;

use crate::error::LedgerError;
use crate::log::JsonLinesLog;
use crate::types::{Contract, EntryType, LedgerEntry, Payout};

/// Check that `entry_type` may be applied to a contract in its current state.
pub fn check_transition(
    contract_id: &str,
    current: Option<&Contract>,
    entry_type: EntryType,
) -> Result<(), LedgerError> {
    match (entry_type, current) {
        (EntryType::Create, None) => Ok(()),
        (_, None) => Err(LedgerError::NotFound(contract_id.to_string())),
        (entry_type, Some(contract))
            if entry_type.required_statuses().contains(&contract.status) =>
        {
            Ok(())
        }
        (entry_type, Some(contract)) => Err(LedgerError::StateConflict {
            contract_id: contract_id.to_string(),
            status: contract.status,
            operation: entry_type.operation(),
        }),
    }
}

/// Apply a single entry to a contract view.
pub fn apply(current: Option<Contract>, entry: &LedgerEntry) -> Result<Contract, LedgerError> {
    check_transition(&entry.contract_id, current.as_ref(), entry.entry_type).map_err(|e| {
        LedgerError::Corrupt(format!("entry {} ({}): {}", entry.seq, entry.entry_type, e))
    })?;

    let Some(mut contract) = current else {
        let parties = entry.parties.as_ref().ok_or_else(|| {
            LedgerError::Corrupt(format!("create entry {} has no parties", entry.seq))
        })?;
        return Ok(Contract {
            contract_id: entry.contract_id.clone(),
            job_id: parties.job_id.clone(),
            requester_id: parties.requester_id.clone(),
            provider_id: parties.provider_id.clone(),
            agreed_price: entry.amount,
            status: entry.entry_type.resulting_status(),
            created_at: entry.timestamp,
            updated_at: entry.timestamp,
            released: 0,
            payout: None,
            last_tx_ref: entry.tx_ref.clone(),
        });
    };

    if entry.entry_type.releases_funds() {
        let released = contract.released + entry.amount;
        if released > contract.agreed_price {
            return Err(LedgerError::Corrupt(format!(
                "contract {} releases {} of {} escrowed",
                contract.contract_id, released, contract.agreed_price
            )));
        }
        contract.released = released;
        contract.payout = Some(entry.payout.unwrap_or(Payout::to_provider(entry.amount)));
    }

    contract.status = entry.entry_type.resulting_status();
    contract.updated_at = entry.timestamp;
    contract.last_tx_ref = entry.tx_ref.clone();
    Ok(contract)
}

/// Fold a set of entries (any order, any contracts) into contract views.
pub fn fold<'a, I>(entries: I) -> Result<HashMap<String, Contract>, LedgerError>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut ordered: Vec<&LedgerEntry> = entries.into_iter().collect();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));

    let mut contracts: HashMap<String, Contract> = HashMap::new();
    for entry in ordered {
        let current = contracts.remove(&entry.contract_id);
        let next = apply(current, entry)?;
        contracts.insert(entry.contract_id.clone(), next);
    }
    Ok(contracts)
}

/// Fold the entries of a single contract.
pub fn fold_contract(contract_id: &str, entries: &[LedgerEntry]) -> Result<Option<Contract>, LedgerError> {
    Ok(fold(entries.iter().filter(|e| e.contract_id == contract_id))?.remove(contract_id))
}

/// Rebuild every contract view from a persisted JSON-lines log.
pub async fn replay(path: impl AsRef<Path>) -> Result<HashMap<String, Contract>, LedgerError> {
    let entries: Vec<LedgerEntry> = JsonLinesLog::read_all(path).await?;
    fold(entries.iter())
}
