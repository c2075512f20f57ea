//! Ledger backend selection.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::backend::LedgerBackend;
use crate::chain::ChainLedger;
use crate::error::LedgerError;
use crate::local::LocalLedger;

/// Which settlement backend to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerConfig {
    /// In-process simulation
    Local {
        #[serde(default)]
        log_path: Option<PathBuf>,
    },
    /// External settlement gateway
    Chain {
        endpoint: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default)]
        log_path: Option<PathBuf>,
    },
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::Local { log_path: None }
    }
}

/// Build the configured backend.
pub async fn connect(config: &LedgerConfig) -> Result<Arc<dyn LedgerBackend>, LedgerError> {
    let backend: Arc<dyn LedgerBackend> = match config {
        LedgerConfig::Local { log_path: None } => Arc::new(LocalLedger::new()),
        LedgerConfig::Local {
            log_path: Some(path),
        } => Arc::new(LocalLedger::open(path).await?),
        LedgerConfig::Chain {
            endpoint,
            api_key,
            timeout_ms,
            log_path,
        } => {
            let ledger = ChainLedger::new(
                endpoint.clone(),
                api_key.clone(),
                Duration::from_millis(*timeout_ms),
            )?;
            match log_path {
                Some(path) => Arc::new(ledger.with_log(path).await?),
                None => Arc::new(ledger),
            }
        }
    };

    info!(backend = backend.id(), "Ledger backend ready");
    Ok(backend)
}
