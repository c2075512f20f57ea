//! Embedding Store.
//!
//! A similarity index over fixed-dimension vectors with metadata:
//! - Dimension fixed by the first insert
//! - Cosine ranking with ties broken by insertion order
//! - Metadata filters applied before ranking

pub mod filter;
pub mod store;

pub use filter::{Filter, Metadata};
pub use store::{cosine_similarity, EmbeddingRecord, EmbeddingStore, ScoredRecord};
