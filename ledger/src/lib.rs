//! Escrow Ledger
//!
//! An append-only record of escrow state transitions. A contract's current
//! status is never stored; it is derived by folding the contract's entries in
//! timestamp order.
//!
//! - **Entries**: `create`, `complete`, `release`, `dispute`, `resolve`
//! - **Journal**: per-contract exclusive sections, sequence numbering, and
//!   optional JSON-lines persistence shared by every backend
//! - **Backends**: [`LocalLedger`] simulates settlement in-process;
//!   [`ChainLedger`] forwards each transition to an external settlement
//!   gateway before recording it
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │            dyn LedgerBackend              │
//! └──────────────┬──────────────┬─────────────┘
//!                ▼              ▼
//!        ┌─────────────┐  ┌─────────────┐
//!        │ LocalLedger │  │ ChainLedger │──▶ settlement gateway (HTTP)
//!        └──────┬──────┘  └──────┬──────┘
//!               └───────┬────────┘
//!                       ▼
//!               ┌──────────────┐
//!               │   Journal    │──▶ JsonLinesLog (optional)
//!               └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ledger::{EscrowRequest, LedgerBackend, LocalLedger};
//!
//! let ledger = LocalLedger::new();
//! ledger.create_escrow(EscrowRequest::new("c-1", "job-1", "req-1", "prov-1", 500)).await?;
//! ledger.complete_job("c-1").await?;
//! ledger.release_payment("c-1").await?;
//! ```

pub mod backend;
pub mod chain;
pub mod config;
pub mod error;
pub mod fold;
pub mod journal;
pub mod local;
pub mod log;
pub mod types;

// Re-export main types
pub use backend::{LedgerBackend, LedgerOp};
pub use chain::{ChainLedger, EscrowState, TransactionReceipt};
pub use config::{connect, LedgerConfig};
pub use error::LedgerError;
pub use fold::{fold, replay};
pub use journal::Journal;
pub use local::LocalLedger;
pub use log::JsonLinesLog;
pub use types::*;
