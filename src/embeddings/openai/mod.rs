
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{EmbeddingBackend, RetryPolicy};
use crate::config::{ConfigError, EmbeddingConfig};

/// Client for OpenAI-compatible `/v1/embeddings` endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    model: String,
    dimension: u32,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Only the third generation models accept a requested output width
fn supports_dimensions(model: &str) -> bool {
    model.starts_with("text-embedding-3")
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let base_url = config.url()?;
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey("openai".to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            agent,
            retry: RetryPolicy::new(config.retry_attempts),
        })
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl EmbeddingBackend for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed_texts(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        debug!("Requesting {} embeddings from {}", texts.len(), self.base_url);

        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
            dimensions: supports_dimensions(&self.model).then_some(self.dimension),
            encoding_format: "float",
        };

        let url = self
            .base_url
            .join("v1/embeddings")
            .context("Failed to build embeddings URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embeddings request")?;

        let response_text = self
            .retry
            .run(url.as_str(), || {
                self.agent
                    .post(url.as_str())
                    .header("Authorization", &self.authorization())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embeddings")?;

        let mut response: EmbeddingsResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embeddings response")?;

        // Entries carry their input position; order is not guaranteed
        response.data.sort_by_key(|d| d.index);
        if response
            .data
            .iter()
            .enumerate()
            .any(|(position, d)| d.index != position)
        {
            anyhow::bail!("Embeddings response does not cover every input exactly once");
        }

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn health_check(&self) -> anyhow::Result<()> {
        let url = self
            .base_url
            .join(&format!("v1/models/{}", self.model))
            .context("Failed to build model URL")?;

        self.retry
            .run(url.as_str(), || {
                self.agent
                    .get(url.as_str())
                    .header("Authorization", &self.authorization())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .with_context(|| format!("Model '{}' is not available", self.model))?;

        info!("Embedding model {} is available at {}", self.model, self.base_url);
        Ok(())
    }
}
