//! Configuration for the marketplace engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ledger::LedgerConfig;
use market_agent::{
    CapabilityConfig, MatchingConfig, NegotiationConfig, PaymentConfig, QualityConfig,
};

use crate::error::{EngineError, Result};

/// Configuration for a marketplace engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Embedding and text-generation backends
    pub capability: CapabilityConfig,
    /// Matching Engine configuration
    pub matching: MatchingConfig,
    /// Negotiation Engine configuration
    pub negotiation: NegotiationConfig,
    /// Quality Gate configuration
    pub quality: QualityConfig,
    /// Payment Controller configuration
    pub payment: PaymentConfig,
    /// Settlement backend
    pub ledger: LedgerConfig,
    /// Background threshold tuning
    pub tuning: TuningConfig,
    /// Orchestrator settings
    pub orchestrator: OrchestratorConfig,
    /// General settings
    pub general: GeneralConfig,
}

impl EngineConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component could run with.
    pub fn validate(&self) -> Result<()> {
        self.negotiation.validate()?;
        if !(0.0..=1.0).contains(&self.matching.threshold) {
            return Err(EngineError::Config(format!(
                "matching threshold {} outside [0, 1]",
                self.matching.threshold
            )));
        }
        if self.matching.max_results == 0 {
            return Err(EngineError::Config("matching max_results must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.quality.pass_threshold) {
            return Err(EngineError::Config(format!(
                "quality pass_threshold {} outside [0, 1]",
                self.quality.pass_threshold
            )));
        }
        for share in [
            Some(self.payment.default_requester_share_bps),
            self.orchestrator.auto_resolve_share_bps,
        ]
        .into_iter()
        .flatten()
        {
            if share > ledger::BASIS_POINTS_TOTAL {
                return Err(EngineError::Config(format!(
                    "requester share {} exceeds {} basis points",
                    share,
                    ledger::BASIS_POINTS_TOTAL
                )));
            }
        }
        self.tuning.validate()
    }
}

/// Inclusive range a tuned value is clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Background threshold tuning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Run the tuner at all
    pub enabled: bool,
    /// Interval between tuning passes (seconds)
    pub interval_secs: u64,
    /// Outcome records read per pass
    pub batch_size: usize,
    /// Fewer records than this leave the thresholds unchanged
    pub min_samples: usize,
    /// Matching threshold range
    pub matching_bounds: Bounds,
    /// Negotiation tolerance range
    pub tolerance_bounds: Bounds,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600, // 1 hour
            batch_size: 100,
            min_samples: 10,
            matching_bounds: Bounds { min: 0.5, max: 0.95 },
            tolerance_bounds: Bounds { min: 0.05, max: 0.25 },
        }
    }
}

impl TuningConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, bounds) in [
            ("matching_bounds", self.matching_bounds),
            ("tolerance_bounds", self.tolerance_bounds),
        ] {
            if bounds.min > bounds.max {
                return Err(EngineError::Config(format!(
                    "{} min {} exceeds max {}",
                    name, bounds.min, bounds.max
                )));
            }
        }
        if self.enabled && self.interval_secs == 0 {
            return Err(EngineError::Config("tuning interval must be positive".to_string()));
        }
        Ok(())
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Requester share applied automatically after a failed quality review;
    /// `None` leaves the job at `disputed` for manual resolution
    pub auto_resolve_share_bps: Option<u16>,
    /// Mirror job transitions to this JSON-lines file
    pub transition_log_path: Option<PathBuf>,
    /// Mirror negotiation proposals to this JSON-lines file
    pub proposal_log_path: Option<PathBuf>,
}

/// General configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
