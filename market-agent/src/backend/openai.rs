//! OpenAI-compatible capability backend.
//!
//! Serves both embeddings (`/embeddings`) and message generation
//! (`/chat/completions`). Works with any OpenAI-compatible API including:
//! - vLLM
//! - Ollama
//! - OpenAI API
//! - LocalAI

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};

use super::traits::*;
use crate::error::{AgentError, Result};
use crate::types::Embedding;

/// OpenAI-compatible backend.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    chat_model: String,
    dimension: usize,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        base_url: impl Into<String>,
        embedding_model: impl Into<String>,
        chat_model: impl Into<String>,
        dimension: usize,
        api_key: Option<String>,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AgentError::ExternalService(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            embedding_model: embedding_model.into(),
            chat_model: chat_model.into(),
            dimension,
        })
    }

    /// Create a backend pointing to Ollama.
    pub fn ollama(embedding_model: &str, chat_model: &str, dimension: usize) -> Result<Self> {
        Self::new(
            "http://localhost:11434/v1",
            embedding_model,
            chat_model,
            dimension,
            None,
        )
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.header(header::AUTHORIZATION, format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn send<B: Serialize>(&self, path: &str, body: &B) -> Result<Response> {
        let response = self
            .post(path)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::ExternalService(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            429 => Err(AgentError::RateLimited {
                retry_after_ms: None,
            }),
            400..=499 => Err(AgentError::Validation(format!("HTTP {}: {}", status, body))),
            _ => Err(AgentError::ExternalService(format!(
                "HTTP {}: {}",
                status, body
            ))),
        }
    }
}

/// Embedding request body.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Embedding response body.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Embedding,
}

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Chat completion response body.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[async_trait]
impl EmbeddingGenerator for OpenAiBackend {
    fn id(&self) -> &str {
        &self.embedding_model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn is_available(&self) -> bool {
        let mut request = self.client.get(format!("{}/models", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        request
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let response = self
            .send(
                "/embeddings",
                &EmbeddingRequest {
                    model: &self.embedding_model,
                    input: text,
                },
            )
            .await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AgentError::Parse("No embedding in response".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(AgentError::DimensionMismatch {
                expected: self.dimension,
                got: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[async_trait]
impl TextGenerator for OpenAiBackend {
    fn id(&self) -> &str {
        &self.chat_model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let mut messages = Vec::new();

        // Add system prompt if present
        if let Some(system) = request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt,
        });

        let chat_request = ChatRequest {
            model: self.chat_model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let response = self.send("/chat/completions", &chat_request).await?;
        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AgentError::Parse("No content in response".to_string()))
    }
}
