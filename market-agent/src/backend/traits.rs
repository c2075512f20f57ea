//! Core traits for capability backends.
//!
//! This module defines the two external capabilities the marketplace
//! depends on: embedding generation and text generation. Both are opaque
//! services; failures surface as [`AgentError`] values and callers decide
//! how to fall back.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::types::Embedding;

/// Turns text into a fixed-dimension embedding.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Backend identifier (e.g., model name).
    fn id(&self) -> &str;

    /// Dimension of the vectors this backend produces.
    fn dimension(&self) -> usize;

    /// Check if the backend is currently available.
    async fn is_available(&self) -> bool {
        true
    }

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed several texts concurrently, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        join_all(texts.iter().map(|text| self.embed(text)))
            .await
            .into_iter()
            .collect()
    }
}

/// Generates short natural-language messages.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Backend identifier (e.g., model name).
    fn id(&self) -> &str;

    /// Generate text for a request.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// Request for text generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System prompt (optional)
    pub system_prompt: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0-2.0)
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// Create a request with a user prompt.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Add a system prompt.
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp.clamp(0.0, 2.0));
        self
    }
}

/// Use `result` if it succeeded, otherwise the value `fallback` builds from the error.
pub fn with_fallback<T, F>(result: Result<T>, fallback: F) -> T
where
    F: FnOnce(&AgentError) -> T,
{
    match result {
        Ok(value) => value,
        Err(e) => fallback(&e),
    }
}
