//! Negotiation Engine.
//!
//! Bounded-round price convergence between a requester and a provider.
//!
//! The requester's bound starts at the job's maximum budget and the
//! provider's at the candidate's rate. Each round the proposer (alternating,
//! requester first) offers the midpoint of the two bounds. The counterparty
//! accepts when the offer falls short of its own bound by no more than the
//! tolerance; otherwise it concedes part of the way toward the offer and
//! the next round begins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger::Amount;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::ProposalLog;
use crate::backend::{with_fallback, GenerationRequest, TextGenerator};
use crate::config::{validate_tolerance, NegotiationConfig};
use crate::error::Result;
use crate::thresholds::Thresholds;
use crate::types::{CandidateProfile, JobSpec};

const MESSAGE_SYSTEM_PROMPT: &str =
    "You are negotiating a freelance contract. Rephrase the message in one or two \
     professional sentences. Keep the stated price exactly as given.";

/// Negotiating party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Requester,
    Provider,
}

impl Party {
    pub fn counterparty(&self) -> Party {
        match self {
            Party::Requester => Party::Provider,
            Party::Provider => Party::Requester,
        }
    }

    /// Proposer of a round (1-based); the requester opens.
    pub fn proposer_of(round: u32) -> Party {
        if round % 2 == 1 {
            Party::Requester
        } else {
            Party::Provider
        }
    }
}

/// Status of a single proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

/// One round's offer. Retained for audit; never modified once settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub job_id: String,
    pub candidate_id: String,
    pub price: f64,
    pub round: u32,
    pub originator: Party,
    pub status: ProposalStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    pub fn pending(
        job_id: impl Into<String>,
        candidate_id: impl Into<String>,
        price: f64,
        round: u32,
        originator: Party,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            candidate_id: candidate_id.into(),
            price,
            round,
            originator,
            status: ProposalStatus::Pending,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    /// The counterparty's answer, as a new record.
    pub fn settle(self, status: ProposalStatus) -> Self {
        Self { status, ..self }
    }
}

/// Negotiation state for a (job, candidate) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// An offer is on the table
    Proposed,
    /// The last offer was rejected and the counterparty conceded
    Countered,
    /// Agreement reached (terminal)
    Accepted,
    /// Bounds too far apart to negotiate (terminal)
    Rejected,
    /// Round budget exhausted (terminal)
    Expired,
}

impl NegotiationStatus {
    pub fn allowed_transitions(&self) -> &'static [NegotiationStatus] {
        use NegotiationStatus::*;
        match self {
            Proposed => &[Accepted, Countered, Rejected],
            Countered => &[Proposed, Expired],
            Accepted | Rejected | Expired => &[],
        }
    }

    pub fn can_transition_to(&self, target: NegotiationStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Expired)
    }
}

/// Result of a negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationOutcome {
    pub job_id: String,
    pub candidate_id: String,
    /// Always terminal
    pub status: NegotiationStatus,
    /// Agreed price, when accepted
    pub agreed_price: Option<Amount>,
    pub rounds_used: u32,
    /// Every proposal made, in order
    pub proposals: Vec<Proposal>,
    /// Acceptance message, when accepted
    pub closing_message: Option<String>,
}

impl NegotiationOutcome {
    pub fn is_accepted(&self) -> bool {
        self.status == NegotiationStatus::Accepted
    }
}

/// Negotiates a price for a (job, candidate) pair.
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(&self, job: &JobSpec, candidate: &CandidateProfile) -> Result<NegotiationOutcome>;
}

/// What a message announces.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MessageKind {
    Opening,
    Counter,
    Acceptance,
}

impl MessageKind {
    fn template(&self, price: f64) -> String {
        match self {
            Self::Opening => format!(
                "I'm interested in this project and would like to propose a rate of ${:.2} \
                 based on the project requirements.",
                price
            ),
            Self::Counter => format!(
                "Thank you for your proposal. Based on the project requirements and market \
                 rates, I'd like to suggest a rate of ${:.2}.",
                price
            ),
            Self::Acceptance => format!(
                "Great! I'm pleased to accept the rate of ${:.2}. Looking forward to working \
                 together on this project.",
                price
            ),
        }
    }
}

/// Tracks the pair's status through the protocol.
struct Session {
    status: NegotiationStatus,
}

impl Session {
    fn advance(&mut self, next: NegotiationStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "invalid negotiation transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
    }
}

/// Midpoint negotiation engine.
pub struct NegotiationEngine {
    config: NegotiationConfig,
    thresholds: Thresholds,
    text: Option<Arc<dyn TextGenerator>>,
    log: Arc<ProposalLog>,
}

impl NegotiationEngine {
    pub fn new(config: NegotiationConfig, thresholds: Thresholds) -> Self {
        Self {
            config,
            thresholds,
            text: None,
            log: Arc::new(ProposalLog::new()),
        }
    }

    /// Phrase proposal messages through a text generator.
    pub fn with_text_generator(mut self, text: Arc<dyn TextGenerator>) -> Self {
        self.text = Some(text);
        self
    }

    /// Record proposals in a shared log.
    pub fn with_log(mut self, log: Arc<ProposalLog>) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> &Arc<ProposalLog> {
        &self.log
    }

    async fn message(&self, kind: MessageKind, price: f64) -> String {
        let template = kind.template(price);
        let Some(text) = &self.text else {
            return template;
        };

        let request = GenerationRequest::prompt(template.clone())
            .with_system(MESSAGE_SYSTEM_PROMPT)
            .with_max_tokens(120);
        with_fallback(text.generate(request).await, |e| {
            warn!(generator = text.id(), error = %e, "Message generation failed, using template");
            template
        })
    }
}

#[async_trait]
impl Negotiator for NegotiationEngine {
    async fn negotiate(&self, job: &JobSpec, candidate: &CandidateProfile) -> Result<NegotiationOutcome> {
        self.config.validate()?;
        job.validate()?;
        candidate.validate()?;

        let tolerance = self.thresholds.snapshot().await.negotiation_tolerance;
        validate_tolerance(tolerance)?;
        let margin = self.config.rejection_margin.unwrap_or(tolerance);

        let mut requester_bound = job.budget_max as f64;
        let mut provider_bound = candidate.rate as f64;
        let mut session = Session {
            status: NegotiationStatus::Proposed,
        };
        let mut outcome = NegotiationOutcome {
            job_id: job.id.clone(),
            candidate_id: candidate.id.clone(),
            status: session.status,
            agreed_price: None,
            rounds_used: 0,
            proposals: Vec::new(),
            closing_message: None,
        };

        // Round zero: too far apart to be worth a single round
        let gap = provider_bound - requester_bound;
        let opening_mid = (requester_bound + provider_bound) / 2.0;
        if gap > margin * opening_mid {
            session.advance(NegotiationStatus::Rejected);
            outcome.status = session.status;
            info!(
                job_id = %job.id,
                candidate_id = %candidate.id,
                budget_max = job.budget_max,
                rate = candidate.rate,
                "Negotiation rejected at round zero"
            );
            return Ok(outcome);
        }

        for round in 1..=self.config.max_rounds {
            if session.status == NegotiationStatus::Countered {
                session.advance(NegotiationStatus::Proposed);
            }

            let proposer = Party::proposer_of(round);
            let price = (requester_bound + provider_bound) / 2.0;
            let kind = if round == 1 {
                MessageKind::Opening
            } else {
                MessageKind::Counter
            };
            let proposal = Proposal::pending(
                &job.id,
                &candidate.id,
                price,
                round,
                proposer,
                self.message(kind, price).await,
            );

            // How far the offer falls short of the counterparty's bound
            let shortfall = match proposer.counterparty() {
                Party::Provider => provider_bound - price,
                Party::Requester => price - requester_bound,
            }
            .max(0.0);
            let accepted = shortfall <= tolerance * price;

            let settled = proposal.settle(if accepted {
                ProposalStatus::Accepted
            } else {
                ProposalStatus::Rejected
            });
            self.log.record(settled.clone()).await;
            outcome.proposals.push(settled);
            outcome.rounds_used = round;

            debug!(
                job_id = %job.id,
                candidate_id = %candidate.id,
                round,
                proposer = ?proposer,
                price,
                accepted,
                "Negotiation round"
            );

            if accepted {
                session.advance(NegotiationStatus::Accepted);
                outcome.agreed_price = Some(price.round() as Amount);
                outcome.closing_message = Some(self.message(MessageKind::Acceptance, price).await);
                break;
            }

            session.advance(NegotiationStatus::Countered);
            match proposer.counterparty() {
                Party::Provider => {
                    provider_bound += self.config.provider_concession * (price - provider_bound)
                }
                Party::Requester => {
                    requester_bound += self.config.requester_concession * (price - requester_bound)
                }
            }
        }

        if session.status == NegotiationStatus::Countered {
            session.advance(NegotiationStatus::Expired);
        }
        outcome.status = session.status;

        info!(
            job_id = %job.id,
            candidate_id = %candidate.id,
            status = ?outcome.status,
            rounds = outcome.rounds_used,
            agreed_price = ?outcome.agreed_price,
            "Negotiation finished"
        );
        Ok(outcome)
    }
}
