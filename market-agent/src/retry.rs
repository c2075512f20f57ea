//! Bounded exponential backoff for external calls.
//!
//! Only transient errors are retried; anything else fails on the first
//! attempt.

use std::future::Future;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::AgentError;
use ledger::LedgerError;

/// Errors that may succeed on retry.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for AgentError {
    fn is_transient(&self) -> bool {
        AgentError::is_transient(self)
    }
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        LedgerError::is_transient(self)
    }
}

/// Final failure of a retried call.
#[derive(Debug)]
pub struct RetryError<E> {
    /// The last error observed
    pub error: E,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl<E: Transient> RetryError<E> {
    /// Whether the call ran out of attempts on a transient error.
    pub fn is_exhausted(&self) -> bool {
        self.error.is_transient()
    }
}

/// Retry policy.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RetryError<E>>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.config.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(RetryError {
                        error,
                        attempts: attempt,
                    })
                }
            }
        }
    }
}
