//! Quality Gate.
//!
//! Compares a deliverable's embedding with the job's requirement embedding.
//! A similarity at or above the pass threshold passes; anything lower fails
//! and is turned into a dispute by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::QualityConfig;
use crate::embedding::cosine_similarity;
use crate::error::{AgentError, Result};
use crate::types::{validate_embedding, Embedding};

/// Work submitted by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
    pub job_id: String,
    pub provider_id: String,
    /// Hex SHA-256 of the submitted content, when content was supplied
    #[serde(default)]
    pub content_hash: Option<String>,
    pub embedding: Embedding,
    pub submitted_at: DateTime<Utc>,
}

impl Deliverable {
    pub fn new(job_id: impl Into<String>, provider_id: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            job_id: job_id.into(),
            provider_id: provider_id.into(),
            content_hash: None,
            embedding,
            submitted_at: Utc::now(),
        }
    }

    /// Attach the submitted content's hash.
    pub fn with_content(mut self, content: &[u8]) -> Self {
        self.content_hash = Some(content_hash(content));
        self
    }
}

/// Hex SHA-256 of deliverable content.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Quality verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Result of a quality review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub verdict: Verdict,
    /// Deliverable/requirement similarity
    pub similarity: f64,
    /// Threshold the similarity was compared against
    pub threshold: f64,
    pub feedback: String,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Reviews deliverables against a requirement embedding.
#[async_trait]
pub trait QualityChecker: Send + Sync {
    async fn review(&self, deliverable: &Deliverable, requirement: &[f32]) -> Result<QualityReport>;
}

/// Similarity-threshold quality gate.
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> f64 {
        self.config.pass_threshold
    }

    /// Verdict for a similarity score. The threshold itself passes.
    pub fn verdict_for(&self, similarity: f64) -> Verdict {
        if similarity >= self.config.pass_threshold {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

#[async_trait]
impl QualityChecker for QualityGate {
    async fn review(&self, deliverable: &Deliverable, requirement: &[f32]) -> Result<QualityReport> {
        validate_embedding(&deliverable.embedding)?;
        if deliverable.embedding.len() != requirement.len() {
            return Err(AgentError::DimensionMismatch {
                expected: requirement.len(),
                got: deliverable.embedding.len(),
            });
        }

        let similarity = cosine_similarity(&deliverable.embedding, requirement);
        let verdict = self.verdict_for(similarity);
        let feedback = match verdict {
            Verdict::Pass => format!("Similarity score: {:.2}. Approved.", similarity),
            Verdict::Fail => format!("Similarity score: {:.2}. Needs revision.", similarity),
        };

        info!(
            job_id = %deliverable.job_id,
            provider_id = %deliverable.provider_id,
            similarity,
            threshold = self.config.pass_threshold,
            verdict = ?verdict,
            "Quality review"
        );

        Ok(QualityReport {
            verdict,
            similarity,
            threshold: self.config.pass_threshold,
            feedback,
        })
    }
}
