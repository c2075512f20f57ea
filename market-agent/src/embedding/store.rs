//! Similarity index over fixed-dimension vectors.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::filter::{Filter, Metadata};
use crate::error::{AgentError, Result};
use crate::types::{validate_embedding, Embedding};

/// A stored vector with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Embedding,
    pub metadata: Metadata,
}

/// A query hit.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    /// Cosine similarity to the query vector
    pub score: f64,
    pub record: Arc<EmbeddingRecord>,
}

struct Slot {
    record: Arc<EmbeddingRecord>,
    /// Insertion order of the id; kept across overwrites
    inserted: u64,
}

/// In-memory embedding store.
///
/// Writes to one id are serialized by the map's shard locks; readers see
/// either the old or the new record, never a mix.
pub struct EmbeddingStore {
    dimension: OnceLock<usize>,
    records: DashMap<String, Slot>,
    next_insert: AtomicU64,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self {
            dimension: OnceLock::new(),
            records: DashMap::new(),
            next_insert: AtomicU64::new(0),
        }
    }

    /// Store with its dimension fixed up front.
    pub fn with_dimension(dimension: usize) -> Self {
        let store = Self::new();
        // A fresh OnceLock always accepts its first value
        let _ = store.dimension.set(dimension);
        store
    }

    /// Fixed dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check a vector against the store's dimension without storing it.
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        validate_embedding(vector)?;
        match self.dimension() {
            Some(expected) if expected != vector.len() => Err(AgentError::DimensionMismatch {
                expected,
                got: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Store or overwrite a record.
    pub fn put(&self, id: impl Into<String>, vector: Embedding, metadata: Metadata) -> Result<()> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AgentError::Validation("record id is required".to_string()));
        }
        validate_embedding(&vector)?;

        let expected = *self.dimension.get_or_init(|| vector.len());
        if expected != vector.len() {
            return Err(AgentError::DimensionMismatch {
                expected,
                got: vector.len(),
            });
        }

        let record = Arc::new(EmbeddingRecord {
            id: id.clone(),
            vector,
            metadata,
        });

        self.records
            .entry(id.clone())
            .and_modify(|slot| slot.record = Arc::clone(&record))
            .or_insert_with(|| Slot {
                record,
                inserted: self.next_insert.fetch_add(1, Ordering::SeqCst),
            });

        debug!(id = %id, "Embedding stored");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<EmbeddingRecord>> {
        self.records.get(id).map(|slot| Arc::clone(&slot.record))
    }

    /// Remove a record. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        self.records.remove(id).is_some()
    }

    /// Up to `top_k` records passing `filter`, by descending similarity.
    ///
    /// Ties are broken by insertion order, earliest first.
    pub fn query(&self, vector: &[f32], filter: &Filter, top_k: usize) -> Result<Vec<ScoredRecord>> {
        validate_embedding(vector)?;
        let Some(expected) = self.dimension() else {
            return Ok(Vec::new());
        };
        if expected != vector.len() {
            return Err(AgentError::DimensionMismatch {
                expected,
                got: vector.len(),
            });
        }

        let mut hits: Vec<(u64, ScoredRecord)> = self
            .records
            .iter()
            .filter(|slot| filter.matches(slot.key(), &slot.record.metadata))
            .map(|slot| {
                let record = Arc::clone(&slot.record);
                (
                    slot.inserted,
                    ScoredRecord {
                        id: record.id.clone(),
                        score: cosine_similarity(vector, &record.vector),
                        record,
                    },
                )
            })
            .collect();

        hits.sort_by(|(a_seq, a), (b_seq, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a_seq.cmp(b_seq))
        });

        Ok(hits.into_iter().take(top_k).map(|(_, hit)| hit).collect())
    }
}

impl Default for EmbeddingStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine similarity, computed in `f64`.
///
/// Zero-norm vectors have similarity 0 to everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
