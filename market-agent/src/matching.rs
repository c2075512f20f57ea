//! Matching Engine.
//!
//! Ranks registered candidates for a job by portfolio/requirement similarity.
//! Candidates must share enough skills with the job to be considered at all,
//! and must clear the current matching threshold to be returned.

use async_trait::async_trait;
use ledger::Amount;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::EmbeddingGenerator;
use crate::config::MatchingConfig;
use crate::directory::{CandidateDirectory, CANDIDATE_KIND, KIND_KEY, SKILLS_KEY};
use crate::embedding::{EmbeddingStore, Filter};
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::thresholds::Thresholds;
use crate::types::{normalize_skills, Embedding, JobSpec};

/// A ranked candidate for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub candidate_id: String,
    /// Portfolio/requirement similarity
    pub score: f64,
    /// Skills shared with the job
    pub shared_skills: usize,
    /// Candidate's minimum rate
    pub rate: Amount,
}

/// Finds candidates for a job.
#[async_trait]
pub trait Matcher: Send + Sync {
    /// The job's requirement embedding, generated from its text when the
    /// posting carries none.
    async fn requirement_embedding(&self, job: &JobSpec) -> Result<Embedding>;

    /// Ranked matches, best first, never including a candidate in `exclude`.
    /// An empty list means no match.
    async fn find_matches(&self, job: &JobSpec, exclude: &[String]) -> Result<Vec<CandidateMatch>>;
}

/// Embedding-similarity matcher.
pub struct MatchingEngine {
    config: MatchingConfig,
    store: Arc<EmbeddingStore>,
    directory: Arc<CandidateDirectory>,
    embedder: Arc<dyn EmbeddingGenerator>,
    thresholds: Thresholds,
    retry: RetryPolicy,
}

impl MatchingEngine {
    pub fn new(
        config: MatchingConfig,
        directory: Arc<CandidateDirectory>,
        embedder: Arc<dyn EmbeddingGenerator>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            retry: RetryPolicy::new(config.retry.clone()),
            store: Arc::clone(directory.store()),
            config,
            directory,
            embedder,
            thresholds,
        }
    }

    /// Rank candidates against an already-computed requirement embedding.
    ///
    /// Excluded candidates are filtered out before the result cap applies.
    pub async fn rank(
        &self,
        job: &JobSpec,
        requirement: &[f32],
        exclude: &[String],
    ) -> Result<Vec<CandidateMatch>> {
        self.store.check_dimension(requirement)?;

        let threshold = self.thresholds.snapshot().await.matching;
        let job_skills = normalize_skills(&job.skills);
        let mut filter = Filter::eq(KIND_KEY, CANDIDATE_KIND).and(Filter::overlap(
            SKILLS_KEY,
            job_skills.clone(),
            self.config.min_shared_skills,
        ));
        if !exclude.is_empty() {
            filter = filter.and(Filter::excluding(exclude.iter().cloned()));
        }

        let hits = self
            .store
            .query(requirement, &filter, self.config.max_results)?;

        let matches: Vec<CandidateMatch> = hits
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .filter_map(|hit| {
                let profile = self.directory.get(&hit.id)?;
                let shared_skills = normalize_skills(&profile.skills)
                    .iter()
                    .filter(|s| job_skills.contains(s))
                    .count();
                Some(CandidateMatch {
                    candidate_id: hit.id,
                    score: hit.score,
                    shared_skills,
                    rate: profile.rate,
                })
            })
            .collect();

        info!(
            job_id = %job.id,
            threshold,
            excluded = exclude.len(),
            matches = matches.len(),
            "Matching complete"
        );
        Ok(matches)
    }
}

#[async_trait]
impl Matcher for MatchingEngine {
    async fn requirement_embedding(&self, job: &JobSpec) -> Result<Embedding> {
        if let Some(embedding) = &job.requirement_embedding {
            return Ok(embedding.clone());
        }

        let text = job.requirement_text();
        let embedding = self
            .retry
            .run("embed_requirement", || self.embedder.embed(&text))
            .await
            .map_err(|e| e.error)?;

        debug!(job_id = %job.id, embedder = self.embedder.id(), "Requirement embedding generated");
        Ok(embedding)
    }

    async fn find_matches(&self, job: &JobSpec, exclude: &[String]) -> Result<Vec<CandidateMatch>> {
        job.validate()?;
        let requirement = self.requirement_embedding(job).await?;
        self.rank(job, &requirement, exclude).await
    }
}
