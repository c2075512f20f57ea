//! Tunable thresholds shared between the engines and the background tuner.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Point-in-time copy of the tunable thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSnapshot {
    /// Minimum similarity for a match
    pub matching: f64,
    /// Negotiation acceptance tolerance
    pub negotiation_tolerance: f64,
}

/// Shared handle to the current thresholds.
///
/// Readers take a snapshot at the start of an operation, so an adjustment
/// never changes the rules halfway through a match or negotiation.
#[derive(Debug, Clone)]
pub struct Thresholds {
    inner: Arc<RwLock<ThresholdSnapshot>>,
}

impl Thresholds {
    pub fn new(matching: f64, negotiation_tolerance: f64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ThresholdSnapshot {
                matching,
                negotiation_tolerance,
            })),
        }
    }

    pub async fn snapshot(&self) -> ThresholdSnapshot {
        *self.inner.read().await
    }

    /// Replace the thresholds, returning the previous values.
    pub async fn update(&self, next: ThresholdSnapshot) -> ThresholdSnapshot {
        let mut current = self.inner.write().await;
        std::mem::replace(&mut *current, next)
    }
}
