//! Deterministic in-process capability backends.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::traits::*;
use crate::error::{AgentError, Result};
use crate::types::Embedding;

/// Hash-based embedder.
///
/// Expands the SHA-256 digest of the text into `dimension` components in
/// `[-1, 1)` and normalizes to unit length. Equal texts embed identically;
/// the vectors carry no semantics.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn digest_bytes(&self, text: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.dimension);
        let mut block: u32 = 0;
        while bytes.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            if block > 0 {
                hasher.update(block.to_be_bytes());
            }
            bytes.extend_from_slice(&hasher.finalize());
            block += 1;
        }
        bytes.truncate(self.dimension);
        bytes
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingGenerator for HashEmbedder {
    fn id(&self) -> &str {
        "sha256-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(AgentError::Validation("cannot embed empty text".to_string()));
        }

        let mut embedding: Embedding = self
            .digest_bytes(text)
            .into_iter()
            .map(|b| b as f32 / 128.0 - 1.0)
            .collect();

        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(embedding)
    }
}

/// Template generator: returns the prompt text unchanged.
///
/// Callers compose the full message as the prompt; remote generators
/// rephrase it, this one passes it through.
#[derive(Debug, Default, Clone)]
pub struct TemplateGenerator;

#[async_trait]
impl TextGenerator for TemplateGenerator {
    fn id(&self) -> &str {
        "template"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        Ok(request.prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[tokio::test]
    async fn test_hash_embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("rust parser").await.unwrap();
        let b = embedder.embed("rust parser").await.unwrap();
        let c = embedder.embed("go service").await.unwrap();

        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_hash_embedding_expands_dimension() {
        let embedder = HashEmbedder::new(100);
        let embedding = embedder.embed("text").await.unwrap();
        assert_eq!(embedding.len(), 100);
        assert_eq!(embedder.dimension(), 100);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = HashEmbedder::new(8);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed("a").await.unwrap());
        assert_eq!(batch[1], embedder.embed("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let embedder = HashEmbedder::default();
        assert!(matches!(
            embedder.embed("  ").await,
            Err(AgentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_template_passthrough() {
        let text = TemplateGenerator
            .generate(GenerationRequest::prompt("I propose $575.00."))
            .await
            .unwrap();
        assert_eq!(text, "I propose $575.00.");
    }
}
