//! Job records and the per-job state machine.

use chrono::{DateTime, Utc};
use ledger::Amount;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use market_agent::{CandidateMatch, Deliverable, JobSpec, NegotiationOutcome, QualityReport};

/// Lifecycle state of a job.
///
/// `posted → matched → negotiating → contracted → submitted → qa_review →
/// completed_paid`, or into `disputed → resolved`. A failed negotiation
/// returns the job to `matched` (next candidate) or `posted` (none left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Posted,
    Matched,
    Negotiating,
    Contracted,
    Submitted,
    QaReview,
    /// Funds released to the provider (terminal)
    CompletedPaid,
    Disputed,
    /// Escrow split between the parties (terminal)
    Resolved,
}

impl JobState {
    pub fn allowed_transitions(&self) -> &'static [JobState] {
        use JobState::*;
        match self {
            Posted => &[Matched],
            Matched => &[Negotiating, Posted],
            Negotiating => &[Contracted, Matched, Posted],
            Contracted => &[Submitted, Disputed],
            Submitted => &[QaReview, Disputed],
            QaReview => &[CompletedPaid, Disputed],
            Disputed => &[Resolved],
            CompletedPaid | Resolved => &[],
        }
    }

    pub fn can_transition_to(&self, target: JobState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CompletedPaid | Self::Resolved)
    }

    /// Whether a contract (and its escrow) exists for the job.
    pub fn is_contracted(&self) -> bool {
        matches!(
            self,
            Self::Contracted
                | Self::Submitted
                | Self::QaReview
                | Self::CompletedPaid
                | Self::Disputed
                | Self::Resolved
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posted => "posted",
            Self::Matched => "matched",
            Self::Negotiating => "negotiating",
            Self::Contracted => "contracted",
            Self::Submitted => "submitted",
            Self::QaReview => "qa_review",
            Self::CompletedPaid => "completed_paid",
            Self::Disputed => "disputed",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger step (or matching) that must be re-attempted on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PendingStep {
    /// Requirement matching
    Match,
    /// Fund escrow for an accepted negotiation
    OpenEscrow { candidate_id: String, price: Amount },
    /// Complete the contract and release escrow
    Release,
    /// Freeze escrow; `auto_resolve` follows a failed quality review
    Dispute { auto_resolve: bool },
    /// Split escrow
    Resolve { requester_share_bps: Option<u16> },
}

impl PendingStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::OpenEscrow { .. } => "open_escrow",
            Self::Release => "release",
            Self::Dispute { .. } => "dispute",
            Self::Resolve { .. } => "resolve",
        }
    }
}

/// Marker on a job that needs manual intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stall {
    pub step: PendingStep,
    pub reason: String,
    pub since: DateTime<Utc>,
}

/// A job and everything the orchestrator has learned about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub spec: JobSpec,
    pub state: JobState,
    /// Matched candidates not yet negotiated with, best first
    pub candidates: VecDeque<CandidateMatch>,
    /// Candidates already negotiated with
    pub tried: Vec<String>,
    /// Whether matching ever produced a candidate
    pub ever_matched: bool,
    /// Candidate currently or last negotiated with
    pub provider_id: Option<String>,
    pub negotiation: Option<NegotiationOutcome>,
    pub contract_id: Option<String>,
    pub agreed_price: Option<Amount>,
    pub deliverable: Option<Deliverable>,
    pub quality: Option<QualityReport>,
    pub stall: Option<Stall>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            spec,
            state: JobState::Posted,
            candidates: VecDeque::new(),
            tried: Vec::new(),
            ever_matched: false,
            provider_id: None,
            negotiation: None,
            contract_id: None,
            agreed_price: None,
            deliverable: None,
            quality: None,
            stall: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn is_stalled(&self) -> bool {
        self.stall.is_some()
    }
}
