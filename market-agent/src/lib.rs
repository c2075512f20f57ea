//! Market Agent - Matching, Negotiation, Quality and Payment
//!
//! The mid-level marketplace components the orchestrator sequences:
//! - Embedding store with metadata filters and stable similarity ranking
//! - Trait-based capability backends (local hash/template, OpenAI-compatible)
//! - Matching Engine over registered candidate portfolios
//! - Bounded-round Negotiation Engine with a proposal audit trail
//! - Quality Gate comparing deliverables with job requirements
//! - Payment Controller wrapping any [`ledger::LedgerBackend`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌─────────────────┐  ┌─────────────┐  ┌───────────────────┐
//! │MatchingEngine│  │NegotiationEngine│  │ QualityGate │  │ PaymentController │
//! └──────┬───────┘  └────────┬────────┘  └──────┬──────┘  └─────────┬─────────┘
//!        │                   │                  │                   │
//!        ▼                   ▼                  ▼                   ▼
//! ┌──────────────────┐ ┌────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │CandidateDirectory│ │TextGenerator│  │  EmbeddingStore  │  │ dyn LedgerBackend│
//! └────────┬─────────┘ └────────────┘  └──────────────────┘  └──────────────────┘
//!          ▼
//!   EmbeddingStore  ◀── EmbeddingGenerator
//! ```
//!
//! Matching and negotiation read their thresholds from a shared
//! [`Thresholds`] handle, which a background tuner may adjust.

pub mod audit;
pub mod backend;
pub mod config;
pub mod directory;
pub mod embedding;
pub mod error;
pub mod matching;
pub mod negotiation;
pub mod payment;
pub mod quality;
pub mod retry;
pub mod thresholds;
pub mod types;

// Re-export main types for convenience
pub use audit::ProposalLog;
pub use backend::{Capabilities, EmbeddingGenerator, GenerationRequest, TextGenerator};
pub use config::{
    CapabilityConfig, MatchingConfig, NegotiationConfig, PaymentConfig, QualityConfig, RetryConfig,
};
pub use directory::{job_record_id, CandidateDirectory};
pub use embedding::{cosine_similarity, EmbeddingStore, Filter};
pub use error::{AgentError, Result};
pub use matching::{CandidateMatch, Matcher, MatchingEngine};
pub use negotiation::{
    NegotiationEngine, NegotiationOutcome, NegotiationStatus, Negotiator, Party, Proposal,
    ProposalStatus,
};
pub use payment::{PaymentController, PaymentError, PaymentResult};
pub use quality::{Deliverable, QualityChecker, QualityGate, QualityReport, Verdict};
pub use retry::{RetryError, RetryPolicy, Transient};
pub use thresholds::{ThresholdSnapshot, Thresholds};
pub use types::*;
