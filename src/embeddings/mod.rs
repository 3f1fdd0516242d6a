// Embeddings module
// Provider clients run on the blocking pool behind a shared concurrency limit


pub mod ollama;
pub mod openai;
pub mod retry;

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::config::{Config, EmbeddingProviderKind};
use crate::{RagError, Result};

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;

/// Turns text into fixed-width vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    /// Width of every vector this provider returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::EmbeddingProvider("provider returned no vector".to_string()))
    }

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Blocking HTTP client for one provider API
pub trait EmbeddingBackend: Send + Sync + 'static {
    fn model(&self) -> &str;

    /// Embed one request-sized batch, retrying transient failures
    fn embed_texts(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Splits batches into request-sized pieces and runs them on the blocking pool, with
/// at most `max_concurrent_requests` requests in flight across all callers
pub struct BoundedEmbedder<B> {
    backend: Arc<B>,
    permits: Arc<Semaphore>,
    batch_size: usize,
    dimension: usize,
}

impl<B: EmbeddingBackend> BoundedEmbedder<B> {
    #[inline]
    pub fn new(
        backend: B,
        batch_size: usize,
        max_concurrent_requests: usize,
        dimension: usize,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            batch_size: batch_size.max(1),
            dimension,
        }
    }

    async fn embed_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        // Waiting for a permit queues the request; it never fails on its own
        let _permit = self.permits.acquire().await.map_err(|e| {
            RagError::EmbeddingProvider(format!("embedding limiter closed: {}", e))
        })?;

        let backend = Arc::clone(&self.backend);
        let expected = texts.len();
        let vectors = tokio::task::spawn_blocking(move || backend.embed_texts(&texts))
            .await
            .map_err(|e| RagError::EmbeddingProvider(format!("embedding task failed: {}", e)))?
            .map_err(|e| RagError::EmbeddingProvider(format!("{:#}", e)))?;

        if vectors.len() != expected {
            return Err(RagError::EmbeddingProvider(format!(
                "Mismatch between request and response counts: {} vs {}",
                expected,
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::EmbeddingProvider(format!(
                "provider returned a {}-dimensional vector, expected {}",
                bad.len(),
                self.dimension
            )));
        }

        Ok(vectors)
    }
}

#[async_trait]
impl<B: EmbeddingBackend> EmbeddingProvider for BoundedEmbedder<B> {
    fn model(&self) -> &str {
        self.backend.model()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    #[instrument(skip_all, fields(texts = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requests = texts
            .chunks(self.batch_size)
            .map(|chunk| self.embed_request(chunk.to_vec()));
        let vectors: Vec<Vec<f32>> = try_join_all(requests)
            .await?
            .into_iter()
            .flatten()
            .collect();

        debug!("Generated {} embeddings", vectors.len());
        Ok(vectors)
    }

    async fn health_check(&self) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.health_check())
            .await
            .map_err(|e| RagError::EmbeddingProvider(format!("health check task failed: {}", e)))?
            .map_err(|e| RagError::EmbeddingProvider(format!("{:#}", e)))
    }
}

/// Build the configured embedding provider
#[inline]
pub fn create_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let settings = &config.embeddings;
    let batch_size = settings.batch_size as usize;
    let concurrency = settings.max_concurrent_requests as usize;
    let dimension = settings.dimension as usize;

    let provider: Arc<dyn EmbeddingProvider> = match settings.provider {
        EmbeddingProviderKind::OpenAi => Arc::new(BoundedEmbedder::new(
            OpenAiClient::new(settings)?,
            batch_size,
            concurrency,
            dimension,
        )),
        EmbeddingProviderKind::Ollama => Arc::new(BoundedEmbedder::new(
            OllamaClient::new(settings)?,
            batch_size,
            concurrency,
            dimension,
        )),
    };

    debug!(
        "Embedding provider {:?} with model {}",
        settings.provider,
        provider.model()
    );
    Ok(provider)
}
