//! Market Engine - Job-Lifecycle Orchestration
//!
//! Drives each posted job from matching to payment:
//!
//! - **Per-job state machine**: posted, matched, negotiating, contracted,
//!   submitted, qa_review, then completed_paid or disputed and resolved
//! - **Exclusive sections**: one job's transitions never interleave; jobs
//!   progress concurrently on their own workers
//! - **Idempotent events**: replaying an event a job has passed is a no-op
//! - **Stalls**: exhausted retries against external services park the job
//!   for manual [`Orchestrator::resume`] instead of failing it
//! - **Feedback**: terminal outcomes feed a best-effort threshold tuner
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │  JobStore ── JobEvent ── JobState FSM ── TransitionJournal   │
//! └───┬──────────────┬──────────────┬──────────────┬─────────────┘
//!     ▼              ▼              ▼              ▼
//! ┌─────────┐  ┌────────────┐  ┌─────────┐  ┌──────────────────┐
//! │ Matcher │  │ Negotiator │  │ Quality │  │PaymentController │
//! └─────────┘  └────────────┘  └─────────┘  └────────┬─────────┘
//!                                                     ▼
//!     OutcomeLog ──▶ ThresholdTuner            dyn LedgerBackend
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod journal;
pub mod metrics;
pub mod orchestrator;
pub mod outcome;
pub mod store;
pub mod tuning;

// Re-export main types
pub use config::{EngineConfig, OrchestratorConfig, TuningConfig};
pub use error::{EngineError, Result};
pub use events::JobEvent;
pub use job::{Job, JobState, PendingStep, Stall};
pub use journal::{Transition, TransitionJournal};
pub use metrics::PerformanceMetrics;
pub use orchestrator::Orchestrator;
pub use outcome::{FinalStatus, OutcomeLog, OutcomeRecord};
pub use tuning::ThresholdTuner;
