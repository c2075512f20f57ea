//! Events that drive a job through its lifecycle.

use serde::{Deserialize, Serialize};

use market_agent::{Deliverable, Party};

use crate::job::JobState;

/// An external or internal event for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// Run matching for a posted job
    Match,
    /// Negotiate with the next matched candidate
    Negotiate,
    /// Provider submitted work
    Submit { deliverable: Deliverable },
    /// Review the submitted work and settle accordingly
    Review,
    /// Either party disputes the contract
    RaiseDispute { by: Party },
    /// Split escrow; `None` applies the configured default share
    Resolve { requester_share_bps: Option<u16> },
}

/// How an event relates to a job's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The event's transition starts here
    Apply,
    /// The job is already past the event's transition
    AlreadyApplied,
    /// The event cannot apply to this state
    Conflict,
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Negotiate => "negotiate",
            Self::Submit { .. } => "submit",
            Self::Review => "review",
            Self::RaiseDispute { .. } => "raise_dispute",
            Self::Resolve { .. } => "resolve",
        }
    }

    pub fn disposition(&self, state: JobState) -> Disposition {
        use Disposition::*;
        use JobState::*;
        match (self, state) {
            (Self::Match, Posted) => Apply,
            (Self::Match, _) => AlreadyApplied,

            (Self::Negotiate, Matched) => Apply,
            (Self::Negotiate, Posted) => Conflict,
            (Self::Negotiate, _) => AlreadyApplied,

            (Self::Submit { .. }, Contracted) => Apply,
            (Self::Submit { .. }, Posted | Matched | Negotiating) => Conflict,
            (Self::Submit { .. }, _) => AlreadyApplied,

            (Self::Review, Submitted) => Apply,
            (Self::Review, Posted | Matched | Negotiating | Contracted) => Conflict,
            (Self::Review, _) => AlreadyApplied,

            (Self::RaiseDispute { .. }, Contracted | Submitted | QaReview) => Apply,
            (Self::RaiseDispute { .. }, Disputed | Resolved) => AlreadyApplied,
            (Self::RaiseDispute { .. }, _) => Conflict,

            (Self::Resolve { .. }, Disputed) => Apply,
            (Self::Resolve { .. }, Resolved) => AlreadyApplied,
            (Self::Resolve { .. }, _) => Conflict,
        }
    }
}
