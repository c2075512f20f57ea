//! Registered candidates and their portfolio embeddings, plus the
//! requirement records of posted jobs.

use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::embedding::{EmbeddingRecord, EmbeddingStore, Metadata};
use crate::error::{AgentError, Result};
use crate::types::{normalize_skills, CandidateProfile, Embedding, JobSpec};

/// Metadata key holding the record kind.
pub const KIND_KEY: &str = "kind";
/// Metadata key holding normalized skills.
pub const SKILLS_KEY: &str = "skills";
/// Kind of candidate portfolio records.
pub const CANDIDATE_KIND: &str = "candidate";
/// Kind of job requirement records.
pub const JOB_KIND: &str = "job";

/// Embedding-store id of a job's requirement record.
pub fn job_record_id(job_id: &str) -> String {
    format!("job:{}", job_id)
}

/// Candidate profiles, indexed into the shared embedding store.
pub struct CandidateDirectory {
    store: Arc<EmbeddingStore>,
    profiles: DashMap<String, CandidateProfile>,
}

impl CandidateDirectory {
    pub fn new(store: Arc<EmbeddingStore>) -> Self {
        Self {
            store,
            profiles: DashMap::new(),
        }
    }

    /// Register or update a candidate.
    pub fn register(&self, profile: CandidateProfile) -> Result<()> {
        profile.validate()?;
        if profile.id.starts_with("job:") {
            return Err(AgentError::Validation(format!(
                "candidate id {} uses a reserved prefix",
                profile.id
            )));
        }

        let skills = normalize_skills(&profile.skills);
        let mut metadata = Metadata::new();
        metadata.insert(KIND_KEY.to_string(), json!(CANDIDATE_KIND));
        metadata.insert(SKILLS_KEY.to_string(), json!(skills));
        metadata.insert("rate".to_string(), json!(profile.rate));

        self.store
            .put(profile.id.clone(), profile.portfolio_embedding.clone(), metadata)?;

        info!(candidate_id = %profile.id, rate = profile.rate, skills = ?skills, "Candidate registered");
        self.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    pub fn get(&self, candidate_id: &str) -> Option<CandidateProfile> {
        self.profiles.get(candidate_id).map(|p| p.clone())
    }

    pub fn require(&self, candidate_id: &str) -> Result<CandidateProfile> {
        self.get(candidate_id)
            .ok_or_else(|| AgentError::NotFound(format!("candidate {}", candidate_id)))
    }

    /// Remove a candidate from the directory and the store.
    pub fn remove(&self, candidate_id: &str) -> bool {
        self.store.delete(candidate_id);
        self.profiles.remove(candidate_id).is_some()
    }

    /// Index a job's requirement embedding under [`job_record_id`].
    pub fn index_requirement(&self, job: &JobSpec, requirement: Embedding) -> Result<()> {
        let mut metadata = Metadata::new();
        metadata.insert(KIND_KEY.to_string(), json!(JOB_KIND));
        metadata.insert(SKILLS_KEY.to_string(), json!(normalize_skills(&job.skills)));
        self.store.put(job_record_id(&job.id), requirement, metadata)?;
        debug!(job_id = %job.id, "Requirement indexed");
        Ok(())
    }

    /// A job's indexed requirement record.
    pub fn requirement(&self, job_id: &str) -> Result<Arc<EmbeddingRecord>> {
        self.store
            .get(&job_record_id(job_id))
            .ok_or_else(|| AgentError::NotFound(format!("requirement for job {}", job_id)))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }
}
