//! Capability backend abstraction layer.
//!
//! Provides trait-based interfaces for the external capabilities:
//! - Deterministic local embeddings and template messages
//! - OpenAI-compatible HTTP (vLLM, Ollama, OpenAI, etc.)
//! - Mock backend for testing

pub mod local;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::CapabilityConfig;
use crate::error::Result;

pub use local::{HashEmbedder, TemplateGenerator};
pub use mock::MockBackend;
pub use openai::OpenAiBackend;
pub use traits::{with_fallback, EmbeddingGenerator, GenerationRequest, TextGenerator};

/// The capability backends selected by configuration.
#[derive(Clone)]
pub struct Capabilities {
    pub embedder: Arc<dyn EmbeddingGenerator>,
    pub text: Arc<dyn TextGenerator>,
}

impl Capabilities {
    /// Deterministic local backends.
    pub fn local(dimension: usize) -> Self {
        Self {
            embedder: Arc::new(HashEmbedder::new(dimension)),
            text: Arc::new(TemplateGenerator),
        }
    }

    pub fn from_config(config: &CapabilityConfig) -> Result<Self> {
        match config {
            CapabilityConfig::Local { dimension } => Ok(Self::local(*dimension)),
            CapabilityConfig::OpenAi {
                base_url,
                embedding_model,
                chat_model,
                dimension,
                api_key,
            } => {
                let backend = Arc::new(OpenAiBackend::new(
                    base_url.clone(),
                    embedding_model.clone(),
                    chat_model.clone(),
                    *dimension,
                    api_key.clone(),
                )?);
                Ok(Self {
                    embedder: backend.clone(),
                    text: backend,
                })
            }
        }
    }
}
