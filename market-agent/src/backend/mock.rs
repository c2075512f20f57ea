//! Mock capability backend for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::traits::*;
use crate::error::{AgentError, Result};
use crate::types::Embedding;

/// Mock backend for testing.
///
/// Returns a fixed embedding and a fixed message, and can be made to fail
/// a number of times before succeeding.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    embedding: Embedding,
    response_content: String,
    failures_remaining: AtomicU32,
    call_count: AtomicU32,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            embedding: vec![1.0, 0.0],
            response_content: "Mock response".to_string(),
            failures_remaining: AtomicU32::new(0),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the embedding returned for every text.
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = embedding;
        self
    }

    /// Set the response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Fail the next `count` calls with a transient error.
    pub fn failing(self, count: u32) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(AgentError::ExternalService(
                "Mock backend disabled".to_string(),
            ));
        }

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(AgentError::ExternalService(format!(
                "Mock failure ({} remaining)",
                remaining - 1
            )));
        }
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl EmbeddingGenerator for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.embedding.len()
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn embed(&self, _text: &str) -> Result<Embedding> {
        self.check()?;
        Ok(self.embedding.clone())
    }
}

#[async_trait]
impl TextGenerator for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<String> {
        self.check()?;
        Ok(self.response_content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend() {
        let backend = MockBackend::new("test-model").with_response("Hello, world!");

        assert!(EmbeddingGenerator::is_available(&backend).await);
        assert_eq!(backend.call_count(), 0);

        let response = backend
            .generate(GenerationRequest::prompt("Hi"))
            .await
            .unwrap();

        assert_eq!(response, "Hello, world!");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_fails_then_recovers() {
        let backend = MockBackend::default().failing(2);

        assert!(backend.embed("x").await.unwrap_err().is_transient());
        assert!(backend.embed("x").await.is_err());
        assert_eq!(backend.embed("x").await.unwrap(), vec![1.0, 0.0]);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let backend = MockBackend::new("test-model").with_available(false);
        assert!(!EmbeddingGenerator::is_available(&backend).await);
        assert!(backend.generate(GenerationRequest::prompt("Hi")).await.is_err());
    }
}
