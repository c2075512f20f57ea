//! Error types for marketplace components.

/// Error types for marketplace components.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Malformed input, rejected before any state change
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Vector length differs from the store's fixed dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Unknown job, candidate or record id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Capability backend unreachable or failed
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Rate limited by a capability backend
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Capability backend returned something unusable
    #[error("Parse error: {0}")]
    Parse(String),
}

impl AgentError {
    /// Whether retrying the call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ExternalService(_) | Self::RateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
