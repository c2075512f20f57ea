//! Orchestrator.
//!
//! Owns the per-job state machine and sequences the matching, negotiation,
//! quality and payment components. Every transition runs inside the job's
//! exclusive section and is appended to the transition journal.
//!
//! Events are idempotent: an event whose transition the job has already
//! passed is a no-op. Ledger steps are status-aware, so re-running one after
//! a partial failure picks up where the ledger actually is.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ledger::{Amount, Contract, ContractStatus, LedgerBackend, LedgerError};
use market_agent::{
    validate_embedding, CandidateDirectory, CandidateMatch, CandidateProfile, Capabilities,
    Deliverable, EmbeddingStore, JobSpec, Matcher, MatchingEngine, NegotiationEngine,
    NegotiationStatus, Negotiator, Party, PaymentController, ProposalLog, QualityChecker,
    QualityGate, Thresholds,
};

use crate::config::{EngineConfig, OrchestratorConfig, TuningConfig};
use crate::error::{EngineError, Result};
use crate::events::{Disposition, JobEvent};
use crate::job::{Job, JobState, PendingStep, Stall};
use crate::journal::{Transition, TransitionJournal};
use crate::metrics::PerformanceMetrics;
use crate::outcome::{FinalStatus, OutcomeLog, OutcomeRecord};
use crate::store::JobStore;
use crate::tuning::ThresholdTuner;

/// The job-lifecycle orchestrator.
pub struct Orchestrator {
    config: OrchestratorConfig,
    tuning: TuningConfig,
    jobs: JobStore,
    directory: Arc<CandidateDirectory>,
    matcher: Arc<dyn Matcher>,
    negotiator: Arc<dyn Negotiator>,
    quality: Arc<dyn QualityChecker>,
    payments: PaymentController,
    thresholds: Thresholds,
    proposals: Arc<ProposalLog>,
    transitions: TransitionJournal,
    outcomes: Arc<OutcomeLog>,
}

impl Orchestrator {
    /// Build an orchestrator with the configured ledger and capabilities.
    pub async fn new(config: EngineConfig) -> Result<Self> {
        let ledger = ledger::connect(&config.ledger).await?;
        Self::with_ledger(config, ledger).await
    }

    /// Build an orchestrator over an existing ledger backend.
    pub async fn with_ledger(config: EngineConfig, ledger: Arc<dyn LedgerBackend>) -> Result<Self> {
        let capabilities = Capabilities::from_config(&config.capability)?;
        Self::with_backends(config, capabilities, ledger).await
    }

    /// Build an orchestrator over existing capability and ledger backends.
    pub async fn with_backends(
        config: EngineConfig,
        capabilities: Capabilities,
        ledger: Arc<dyn LedgerBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let directory = Arc::new(CandidateDirectory::new(Arc::new(EmbeddingStore::new())));
        let thresholds = Thresholds::new(config.matching.threshold, config.negotiation.tolerance);
        let proposals = Arc::new(match &config.orchestrator.proposal_log_path {
            Some(path) => ProposalLog::persistent(path).await?,
            None => ProposalLog::new(),
        });

        let matcher = MatchingEngine::new(
            config.matching.clone(),
            Arc::clone(&directory),
            Arc::clone(&capabilities.embedder),
            thresholds.clone(),
        );
        let negotiator = NegotiationEngine::new(config.negotiation.clone(), thresholds.clone())
            .with_text_generator(Arc::clone(&capabilities.text))
            .with_log(Arc::clone(&proposals));

        let transitions = match &config.orchestrator.transition_log_path {
            Some(path) => TransitionJournal::persistent(path).await?,
            None => TransitionJournal::new(),
        };

        info!(
            ledger = ledger.id(),
            embedder = capabilities.embedder.id(),
            text = capabilities.text.id(),
            "Orchestrator initialized"
        );

        Ok(Self {
            quality: Arc::new(QualityGate::new(config.quality.clone())),
            payments: PaymentController::new(config.payment.clone(), ledger),
            config: config.orchestrator,
            tuning: config.tuning,
            jobs: JobStore::new(),
            directory,
            matcher: Arc::new(matcher),
            negotiator: Arc::new(negotiator),
            thresholds,
            proposals,
            transitions,
            outcomes: Arc::new(OutcomeLog::new()),
        })
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Register or update a provider.
    pub fn register_candidate(&self, profile: CandidateProfile) -> Result<()> {
        self.directory.register(profile)?;
        Ok(())
    }

    /// Post a job. Re-posting an identical job is a no-op.
    pub async fn post_job(&self, mut spec: JobSpec) -> Result<JobState> {
        spec.validate()?;

        if let Ok(existing) = self.jobs.snapshot(&spec.id).await {
            let mut incoming = spec.clone();
            if incoming.requirement_embedding.is_none() {
                incoming.requirement_embedding = existing.spec.requirement_embedding.clone();
            }
            if incoming == existing.spec {
                debug!(job_id = %spec.id, state = %existing.state, "Job already posted");
                return Ok(existing.state);
            }
            return Err(EngineError::Validation(format!(
                "job {} already exists with a different posting",
                spec.id
            )));
        }

        let requirement = self.matcher.requirement_embedding(&spec).await?;
        self.directory.index_requirement(&spec, requirement.clone())?;
        spec.requirement_embedding = Some(requirement);

        let job_id = spec.id.clone();
        self.jobs.insert(Job::new(spec))?;
        self.transitions
            .record(&job_id, None, JobState::Posted, "post")
            .await;

        info!(job_id = %job_id, "Job posted");
        Ok(JobState::Posted)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Apply one event to a job under its exclusive section.
    pub async fn handle(&self, job_id: &str, event: JobEvent) -> Result<JobState> {
        let handle = self.jobs.handle(job_id)?;
        let mut job = handle.lock().await;

        match event.disposition(job.state) {
            Disposition::AlreadyApplied => {
                debug!(job_id, state = %job.state, event = event.name(), "Event already applied");
                return Ok(job.state);
            }
            Disposition::Conflict => {
                warn!(job_id, state = %job.state, event = event.name(), "Event rejected");
                return Err(EngineError::StateConflict {
                    job_id: job_id.to_string(),
                    state: job.state,
                    event: event.name(),
                });
            }
            Disposition::Apply => {}
        }

        if let Some(stall) = &job.stall {
            return Err(EngineError::Stalled {
                job_id: job_id.to_string(),
                step: stall.step.name().to_string(),
                reason: stall.reason.clone(),
            });
        }

        match event {
            JobEvent::Match => self.run_match(&mut job).await?,
            JobEvent::Negotiate => self.run_negotiation(&mut job).await?,
            JobEvent::Submit { deliverable } => self.accept_submission(&mut job, deliverable).await?,
            JobEvent::Review => self.run_review(&mut job).await?,
            JobEvent::RaiseDispute { by } => {
                info!(job_id, raised_by = ?by, "Dispute raised");
                self.dispute(&mut job, false).await?
            }
            JobEvent::Resolve { requester_share_bps } => {
                self.resolve(&mut job, requester_share_bps).await?
            }
        }

        Ok(job.state)
    }

    /// Match and negotiate until the job is contracted or back at `posted`.
    pub async fn drive(&self, job_id: &str) -> Result<JobState> {
        let mut state = self.handle(job_id, JobEvent::Match).await?;
        while state == JobState::Matched {
            state = self.handle(job_id, JobEvent::Negotiate).await?;
        }
        Ok(state)
    }

    /// Run [`drive`](Self::drive) on its own task.
    pub fn spawn_worker(self: &Arc<Self>, job_id: impl Into<String>) -> JoinHandle<Result<JobState>> {
        let orchestrator = Arc::clone(self);
        let job_id = job_id.into();
        tokio::spawn(async move { orchestrator.drive(&job_id).await })
    }

    /// Submit work and review it.
    pub async fn submit_deliverable(&self, job_id: &str, deliverable: Deliverable) -> Result<JobState> {
        self.handle(job_id, JobEvent::Submit { deliverable }).await?;
        self.handle(job_id, JobEvent::Review).await
    }

    pub async fn raise_dispute(&self, job_id: &str, by: Party) -> Result<JobState> {
        self.handle(job_id, JobEvent::RaiseDispute { by }).await
    }

    pub async fn resolve_dispute(&self, job_id: &str, requester_share_bps: Option<u16>) -> Result<JobState> {
        self.handle(job_id, JobEvent::Resolve { requester_share_bps }).await
    }

    /// Clear a job's stall marker and re-attempt the step it stalled on.
    pub async fn resume(&self, job_id: &str) -> Result<JobState> {
        let handle = self.jobs.handle(job_id)?;
        let mut job = handle.lock().await;

        let Some(stall) = job.stall.take() else {
            return Ok(job.state);
        };
        info!(job_id, step = stall.step.name(), state = %job.state, "Resuming stalled job");

        match stall.step {
            PendingStep::Match => self.run_match(&mut job).await?,
            PendingStep::OpenEscrow { candidate_id, price } => {
                self.open_escrow(&mut job, candidate_id, price).await?
            }
            PendingStep::Release => self.release(&mut job).await?,
            PendingStep::Dispute { auto_resolve } => self.dispute(&mut job, auto_resolve).await?,
            PendingStep::Resolve { requester_share_bps } => {
                self.resolve(&mut job, requester_share_bps).await?
            }
        }

        Ok(job.state)
    }

    // ------------------------------------------------------------------
    // Steps (caller holds the job's exclusive section)
    // ------------------------------------------------------------------

    async fn run_match(&self, job: &mut Job) -> Result<()> {
        let matches = match self.matcher.find_matches(&job.spec, &job.tried).await {
            Ok(matches) => matches,
            Err(e) if e.is_transient() => return Err(self.stall(job, PendingStep::Match, e.into())),
            Err(e) => return Err(e.into()),
        };

        let fresh: VecDeque<CandidateMatch> = matches
            .into_iter()
            .filter(|m| !job.tried.contains(&m.candidate_id))
            .collect();
        if fresh.is_empty() {
            info!(job_id = %job.id(), "No match, job remains posted");
            return Ok(());
        }

        job.ever_matched = true;
        job.candidates = fresh;
        self.transition(job, JobState::Matched, "match").await
    }

    async fn run_negotiation(&self, job: &mut Job) -> Result<()> {
        while let Some(candidate) = job.candidates.pop_front() {
            let Some(profile) = self.directory.get(&candidate.candidate_id) else {
                warn!(
                    job_id = %job.id(),
                    candidate_id = %candidate.candidate_id,
                    "Matched candidate no longer registered"
                );
                job.tried.push(candidate.candidate_id);
                continue;
            };

            job.tried.push(profile.id.clone());
            job.provider_id = Some(profile.id.clone());
            self.transition(job, JobState::Negotiating, "negotiate").await?;

            let outcome = match self.negotiator.negotiate(&job.spec, &profile).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let back = Self::after_failed_negotiation(job);
                    self.transition(job, back, "negotiation_error").await?;
                    return Err(e.into());
                }
            };

            let agreed = outcome.agreed_price.filter(|_| outcome.is_accepted());
            let status = outcome.status;
            job.negotiation = Some(outcome);

            if let Some(price) = agreed {
                return self.open_escrow(job, profile.id, price).await;
            }

            let final_status = if status == NegotiationStatus::Rejected {
                FinalStatus::NegotiationRejected
            } else {
                FinalStatus::NegotiationExpired
            };
            self.outcomes
                .record(OutcomeRecord::new(job.id(), None, final_status, None))
                .await;

            let back = Self::after_failed_negotiation(job);
            return self.transition(job, back, "negotiation_failed").await;
        }

        self.transition(job, JobState::Posted, "candidates_exhausted").await
    }

    fn after_failed_negotiation(job: &Job) -> JobState {
        if job.candidates.is_empty() {
            JobState::Posted
        } else {
            JobState::Matched
        }
    }

    async fn open_escrow(&self, job: &mut Job, candidate_id: String, price: Amount) -> Result<()> {
        let contract_id = PaymentController::contract_id_for(job.id());
        let step = PendingStep::OpenEscrow {
            candidate_id: candidate_id.clone(),
            price,
        };

        match self.payments.status(&contract_id).await {
            Ok(contract) if contract.provider_id == candidate_id && contract.agreed_price == price => {
                info!(job_id = %job.id(), contract_id = %contract_id, "Escrow already open");
            }
            Ok(contract) => {
                let conflict = LedgerError::StateConflict {
                    contract_id: contract.contract_id,
                    status: contract.status,
                    operation: "create_escrow",
                };
                return Err(self.stall(job, step, conflict.into()));
            }
            Err(e) if e.is_not_found() => {
                if let Err(e) = self.payments.open_escrow(&job.spec, &candidate_id, price).await {
                    return Err(self.stall(job, step, e.into()));
                }
            }
            Err(e) => return Err(self.stall(job, step, e.into())),
        }

        job.contract_id = Some(contract_id);
        job.agreed_price = Some(price);
        job.provider_id = Some(candidate_id);
        self.transition(job, JobState::Contracted, "escrow_opened").await
    }

    async fn accept_submission(&self, job: &mut Job, deliverable: Deliverable) -> Result<()> {
        if deliverable.job_id != job.id() {
            return Err(EngineError::Validation(format!(
                "deliverable for job {} submitted to job {}",
                deliverable.job_id,
                job.id()
            )));
        }
        if job.provider_id.as_deref() != Some(deliverable.provider_id.as_str()) {
            return Err(EngineError::Validation(format!(
                "job {} is not contracted to {}",
                job.id(),
                deliverable.provider_id
            )));
        }
        validate_embedding(&deliverable.embedding)?;
        self.directory.store().check_dimension(&deliverable.embedding)?;

        info!(
            job_id = %job.id(),
            provider_id = %deliverable.provider_id,
            content_hash = ?deliverable.content_hash,
            "Deliverable submitted"
        );
        job.deliverable = Some(deliverable);
        self.transition(job, JobState::Submitted, "submit").await
    }

    async fn run_review(&self, job: &mut Job) -> Result<()> {
        let deliverable = job
            .deliverable
            .clone()
            .ok_or_else(|| EngineError::Validation(format!("job {} has no deliverable", job.id())))?;
        let requirement = self.directory.requirement(job.id())?;
        let report = self.quality.review(&deliverable, &requirement.vector).await?;

        let passed = report.passed();
        job.quality = Some(report);
        self.transition(job, JobState::QaReview, "review").await?;

        if passed {
            self.release(job).await
        } else {
            self.dispute(job, true).await
        }
    }

    async fn release(&self, job: &mut Job) -> Result<()> {
        let contract_id = Self::contract_id(job)?;
        if let Err(e) = self.settle_release(&contract_id).await {
            return Err(self.stall(job, PendingStep::Release, e));
        }
        self.transition(job, JobState::CompletedPaid, "payment_released").await?;
        self.record_outcome(job, FinalStatus::CompletedPaid).await;
        Ok(())
    }

    async fn settle_release(&self, contract_id: &str) -> Result<()> {
        let contract = self.payments.status(contract_id).await?;
        match contract.status {
            ContractStatus::Created => {
                self.payments.complete(contract_id).await?;
                self.payments.release(contract_id).await?;
            }
            ContractStatus::Completed => {
                self.payments.release(contract_id).await?;
            }
            ContractStatus::Paid => {
                debug!(contract_id, "Payment already released");
            }
            // Let the ledger report the conflict
            ContractStatus::Disputed => {
                self.payments.release(contract_id).await?;
            }
        }
        Ok(())
    }

    async fn dispute(&self, job: &mut Job, auto_resolve: bool) -> Result<()> {
        let contract_id = Self::contract_id(job)?;
        if let Err(e) = self.open_dispute_entry(&contract_id).await {
            return Err(self.stall(job, PendingStep::Dispute { auto_resolve }, e));
        }
        self.transition(job, JobState::Disputed, "dispute_opened").await?;

        match self.config.auto_resolve_share_bps {
            Some(share) if auto_resolve => self.resolve(job, Some(share)).await,
            _ => Ok(()),
        }
    }

    async fn open_dispute_entry(&self, contract_id: &str) -> Result<()> {
        let contract = self.payments.status(contract_id).await?;
        if contract.status == ContractStatus::Disputed {
            debug!(contract_id, "Dispute already open");
            return Ok(());
        }
        self.payments.dispute(contract_id).await?;
        Ok(())
    }

    async fn resolve(&self, job: &mut Job, requester_share_bps: Option<u16>) -> Result<()> {
        let contract_id = Self::contract_id(job)?;
        if let Err(e) = self.settle_resolution(&contract_id, requester_share_bps).await {
            return Err(self.stall(job, PendingStep::Resolve { requester_share_bps }, e));
        }
        self.transition(job, JobState::Resolved, "dispute_resolved").await?;
        self.record_outcome(job, FinalStatus::Resolved).await;
        Ok(())
    }

    async fn settle_resolution(&self, contract_id: &str, requester_share_bps: Option<u16>) -> Result<()> {
        let contract = self.payments.status(contract_id).await?;
        if contract.status == ContractStatus::Paid && contract.payout.is_some() {
            debug!(contract_id, "Dispute already resolved");
            return Ok(());
        }
        self.payments.resolve(contract_id, requester_share_bps).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    async fn transition(&self, job: &mut Job, to: JobState, event: &'static str) -> Result<()> {
        let from = job.state;
        if !from.can_transition_to(to) {
            warn!(job_id = %job.id(), from = %from, to = %to, event, "Invalid job transition");
            return Err(EngineError::StateConflict {
                job_id: job.id().to_string(),
                state: from,
                event,
            });
        }

        job.state = to;
        job.updated_at = Utc::now();
        self.transitions.record(job.id(), Some(from), to, event).await;

        info!(job_id = %job.id(), from = %from, to = %to, event, "Job transition");
        Ok(())
    }

    /// Mark a job stalled on `step`. Validation errors leave no marker.
    fn stall(&self, job: &mut Job, step: PendingStep, err: EngineError) -> EngineError {
        if err.is_validation() {
            return err;
        }

        let reason = err.to_string();
        error!(
            job_id = %job.id(),
            state = %job.state,
            step = step.name(),
            error = %reason,
            "Job stalled, manual intervention required"
        );

        let escalate = err.is_transient() || err.is_exhausted();
        let step_name = step.name().to_string();
        job.stall = Some(Stall {
            step,
            reason: reason.clone(),
            since: Utc::now(),
        });
        job.updated_at = Utc::now();

        if escalate {
            EngineError::Stalled {
                job_id: job.id().to_string(),
                step: step_name,
                reason,
            }
        } else {
            err
        }
    }

    async fn record_outcome(&self, job: &Job, final_status: FinalStatus) {
        let rating = job.quality.as_ref().map(|q| q.similarity);
        self.outcomes
            .record(OutcomeRecord::new(
                job.id(),
                job.contract_id.clone(),
                final_status,
                rating,
            ))
            .await;
    }

    fn contract_id(job: &Job) -> Result<String> {
        job.contract_id
            .clone()
            .ok_or_else(|| EngineError::NotFound(format!("contract for job {}", job.id())))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn job(&self, job_id: &str) -> Result<Job> {
        self.jobs.snapshot(job_id).await
    }

    pub async fn state(&self, job_id: &str) -> Result<JobState> {
        Ok(self.jobs.snapshot(job_id).await?.state)
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.all().await
    }

    /// Ledger view of a job's contract.
    pub async fn contract(&self, job_id: &str) -> Result<Contract> {
        let job = self.jobs.snapshot(job_id).await?;
        let contract_id = Self::contract_id(&job)?;
        Ok(self.payments.status(&contract_id).await?)
    }

    pub async fn transitions(&self, job_id: &str) -> Vec<Transition> {
        self.transitions.for_job(job_id).await
    }

    pub async fn performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::from_jobs(&self.jobs.all().await)
    }

    pub fn payments(&self) -> &PaymentController {
        &self.payments
    }

    pub fn directory(&self) -> &Arc<CandidateDirectory> {
        &self.directory
    }

    pub fn proposals(&self) -> &Arc<ProposalLog> {
        &self.proposals
    }

    pub fn outcomes(&self) -> &Arc<OutcomeLog> {
        &self.outcomes
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Tuner over this orchestrator's outcomes and thresholds.
    pub fn tuner(&self) -> ThresholdTuner {
        ThresholdTuner::new(
            self.tuning.clone(),
            self.thresholds.clone(),
            Arc::clone(&self.outcomes),
        )
    }

    /// Start background tuning if enabled.
    pub fn spawn_tuner(&self) -> Option<JoinHandle<()>> {
        if !self.tuning.enabled {
            return None;
        }
        info!(interval_secs = self.tuning.interval_secs, "Threshold tuner started");
        Some(Arc::new(self.tuner()).spawn())
    }
}
