//! Configuration for marketplace components.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AgentError, Result};

/// Matching Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum similarity for a candidate to match
    pub threshold: f64,
    /// Maximum candidates returned
    pub max_results: usize,
    /// Minimum skills shared with the job
    pub min_shared_skills: usize,
    /// Retry policy for embedding generation
    pub retry: RetryConfig,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            max_results: 10,
            min_shared_skills: 1,
            retry: RetryConfig::default(),
        }
    }
}

/// Negotiation Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Round budget
    pub max_rounds: u32,
    /// Acceptable gap, as a fraction of the proposed price
    pub tolerance: f64,
    /// Round-zero rejection margin; defaults to `tolerance`
    pub rejection_margin: Option<f64>,
    /// How far the requester moves toward a rejected proposal
    pub requester_concession: f64,
    /// How far the provider moves toward a rejected proposal
    pub provider_concession: f64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            tolerance: 0.15,
            rejection_margin: None,
            requester_concession: 0.7,
            provider_concession: 0.3,
        }
    }
}

impl NegotiationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(AgentError::Validation(
                "negotiation needs at least one round".to_string(),
            ));
        }
        validate_tolerance(self.tolerance)?;
        for (name, concession) in [
            ("requester_concession", self.requester_concession),
            ("provider_concession", self.provider_concession),
        ] {
            if !(concession > 0.0 && concession <= 1.0) {
                return Err(AgentError::Validation(format!(
                    "{} {} outside (0, 1]",
                    name, concession
                )));
            }
        }
        Ok(())
    }
}

/// Negotiation tolerance must lie in `[0, 1)`.
pub fn validate_tolerance(tolerance: f64) -> Result<()> {
    if !(0.0..1.0).contains(&tolerance) {
        return Err(AgentError::Validation(format!(
            "tolerance {} outside [0, 1)",
            tolerance
        )));
    }
    Ok(())
}

/// Quality Gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum deliverable/spec similarity to pass (inclusive)
    pub pass_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 0.8,
        }
    }
}

/// Retry policy for external calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry (ms)
    pub initial_delay_ms: u64,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Delay cap (ms)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            multiplier: 2.0,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Payment Controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Retry policy for ledger calls
    pub retry: RetryConfig,
    /// Requester share used when a dispute is resolved without an explicit share
    pub default_requester_share_bps: u16,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            default_requester_share_bps: 5000,
        }
    }
}

/// Which embedding and text-generation backend to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityConfig {
    /// Deterministic in-process embeddings and template messages
    Local {
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
    /// OpenAI-compatible HTTP API
    #[serde(rename = "openai")]
    OpenAi {
        base_url: String,
        embedding_model: String,
        chat_model: String,
        #[serde(default = "default_dimension")]
        dimension: usize,
        #[serde(default)]
        api_key: Option<String>,
    },
}

fn default_dimension() -> usize {
    32
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self::Local {
            dimension: default_dimension(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let matching = MatchingConfig::default();
        assert_eq!(matching.threshold, 0.75);
        assert_eq!(matching.max_results, 10);
        assert_eq!(matching.min_shared_skills, 1);

        let negotiation = NegotiationConfig::default();
        assert_eq!(negotiation.max_rounds, 3);
        assert_eq!(negotiation.tolerance, 0.15);
        assert!(negotiation.validate().is_ok());

        assert_eq!(QualityConfig::default().pass_threshold, 0.8);
        assert_eq!(PaymentConfig::default().retry.max_attempts, 3);
    }

    #[test]
    fn test_backoff_is_bounded() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for(3), Duration::from_millis(800));
        assert_eq!(retry.delay_for(20), Duration::from_millis(5000));
    }

    #[test]
    fn test_invalid_negotiation_config() {
        let config = NegotiationConfig {
            max_rounds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = NegotiationConfig {
            provider_concession: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
