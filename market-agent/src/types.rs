//! Common types for the market-agent crate.

use chrono::{DateTime, Utc};
use ledger::Amount;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Fixed-dimension embedding vector.
pub type Embedding = Vec<f32>;

/// A posted job.
///
/// Immutable once a contract exists for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique job identifier
    pub id: String,
    /// Who posted the job and funds its escrow
    pub requester_id: String,
    /// Short description
    pub title: String,
    /// Required skills
    pub skills: Vec<String>,
    /// Lowest acceptable price
    pub budget_min: Amount,
    /// Highest acceptable price
    pub budget_max: Amount,
    /// Delivery deadline
    pub deadline: DateTime<Utc>,
    /// Requirement embedding; generated from title and skills when absent
    #[serde(default)]
    pub requirement_embedding: Option<Embedding>,
}

impl JobSpec {
    /// Reject malformed postings.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AgentError::Validation("job id is required".to_string()));
        }
        if self.requester_id.trim().is_empty() {
            return Err(AgentError::Validation("requester id is required".to_string()));
        }
        if self.skills.iter().all(|s| s.trim().is_empty()) {
            return Err(AgentError::Validation(format!(
                "job {} lists no skills",
                self.id
            )));
        }
        if self.budget_max == 0 || self.budget_min > self.budget_max {
            return Err(AgentError::Validation(format!(
                "job {} has invalid budget [{}, {}]",
                self.id, self.budget_min, self.budget_max
            )));
        }
        if let Some(embedding) = &self.requirement_embedding {
            validate_embedding(embedding)?;
        }
        Ok(())
    }

    /// Text used to generate a requirement embedding.
    pub fn requirement_text(&self) -> String {
        format!("{} {}", self.title, self.skills.join(" "))
    }
}

/// A registered provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    /// Unique candidate identifier
    pub id: String,
    /// Offered skills
    pub skills: Vec<String>,
    /// Minimum acceptable rate
    pub rate: Amount,
    /// Portfolio embedding
    pub portfolio_embedding: Embedding,
}

impl CandidateProfile {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AgentError::Validation("candidate id is required".to_string()));
        }
        if self.rate == 0 {
            return Err(AgentError::Validation(format!(
                "candidate {} has no rate",
                self.id
            )));
        }
        if self.skills.iter().all(|s| s.trim().is_empty()) {
            return Err(AgentError::Validation(format!(
                "candidate {} lists no skills",
                self.id
            )));
        }
        validate_embedding(&self.portfolio_embedding)
    }
}

/// Reject empty vectors and non-finite components.
pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(AgentError::Validation("embedding is empty".to_string()));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(AgentError::Validation(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Lowercased, trimmed skill names.
pub fn normalize_skills(skills: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}
