//! Embedding client for the Ollama `/api/embed` endpoint.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::memory::core::config::EmbeddingConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::embedding::vector::Embedding;

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure of a single embedding call.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Backend unreachable, timed out, or the body could not be read.
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Backend answered with a non-success status.
    #[error("embedding service returned status code {0}")]
    Status(u16),
    /// Response payload did not have the expected shape.
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    /// Response carried no vectors.
    #[error("no embeddings returned")]
    Empty,
}

/// Trait abstraction over embedding backends.
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    /// Returns an error if the embedding request fails.
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, Result<Embedding, EmbeddingError>>;
    /// Return embedding dimensionality.
    fn ndims(&self) -> usize;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    truncate: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder over plain HTTP.
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: Client,
    url: String,
    model: String,
    ndims: usize,
    truncate: bool,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder from config.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> MemoryResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(EmbeddingError::from)?;
        Ok(Self {
            client,
            url: format!("{}/api/embed", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            ndims: config.ndims,
            truncate: config.truncate,
        })
    }

    async fn request(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let body = EmbedRequest {
            model: &self.model,
            input: text,
            truncate: self.truncate,
        };
        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let parsed: EmbedResponse = serde_json::from_slice(&bytes)
            .map_err(|err| EmbeddingError::Malformed(err.to_string()))?;
        let vec = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbeddingError::Empty)?;

        if vec.len() != self.ndims {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} dimensions, got {}",
                self.ndims,
                vec.len()
            )));
        }

        Ok(Embedding::new(vec))
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, Result<Embedding, EmbeddingError>> {
        let text = text.to_string();
        Box::pin(async move { self.request(&text).await })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

/// Embedder wrapper that never fails: backend errors degrade to a zero vector.
#[derive(Clone)]
pub struct FallbackEmbedder {
    inner: Arc<dyn Embedder>,
}

impl FallbackEmbedder {
    /// Wrap an embedder.
    #[must_use]
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self { inner }
    }

    /// Dimension of every vector this wrapper returns.
    #[must_use]
    pub fn ndims(&self) -> usize {
        self.inner.ndims()
    }

    /// Embed `text`, substituting a zero-filled vector on any backend failure.
    pub async fn embed_or_zero(&self, text: &str) -> Embedding {
        if text.trim().is_empty() {
            debug!("blank text; using zero embedding");
            return Embedding::zeros(self.ndims());
        }

        match self.inner.embed_text(text).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, "embedding failed; falling back to zero vector");
                Embedding::zeros(self.ndims())
            }
        }
    }
}
