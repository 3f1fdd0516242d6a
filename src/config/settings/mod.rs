
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::RagError;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 3072;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_CATEGORIES: [&str; 2] = ["NarrativeText", "ListItem"];

pub const ENV_VECTOR_STORE_URI: &str = "RAG_INDEX_VECTOR_STORE_URI";
pub const ENV_EMBEDDING_PROVIDER: &str = "RAG_INDEX_EMBEDDING_PROVIDER";
pub const ENV_EMBEDDING_BASE_URL: &str = "RAG_INDEX_EMBEDDING_BASE_URL";
pub const ENV_EMBEDDING_MODEL: &str = "RAG_INDEX_EMBEDDING_MODEL";
pub const ENV_EMBEDDING_DIMENSION: &str = "RAG_INDEX_EMBEDDING_DIMENSION";
pub const ENV_EMBEDDING_CONCURRENCY: &str = "RAG_INDEX_EMBEDDING_CONCURRENCY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    LanceDb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: StoreBackend,
    /// Connection URI; defaults to `<config dir>/vectors`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Rows required before the ANN index can be trained
    pub ann_min_rows: usize,
    pub hnsw: HnswConfig,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::LanceDb,
            uri: None,
            ann_min_rows: 1024,
            hnsw: HnswConfig::default(),
        }
    }
}

/// Build parameters for the graph ANN index on the vector field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HnswConfig {
    pub m: u32,
    pub ef_construction: u32,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 8,
            ef_construction: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    OpenAi,
    Ollama,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: u32,
    pub batch_size: u32,
    pub max_concurrent_requests: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAi,
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 64,
            max_concurrent_requests: 4,
            timeout_seconds: 30,
            retry_attempts: 3,
        }
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexingConfig {
    /// Metadata keys outside the row schema that are accepted and discarded
    pub allowed_extra_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_categories: Vec<String>,
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_categories: DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect(),
            default_limit: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(u32),
    #[error("Invalid embedding dimension: {0} (must be between 2 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid concurrency limit: {0} (must be between 1 and 64)")]
    InvalidConcurrency(u32),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid HNSW parameters: m={0}, ef_construction={1}")]
    InvalidHnswParameters(u32, u32),
    #[error("Invalid ANN minimum rows: {0} (must be at least 1)")]
    InvalidAnnMinRows(usize),
    #[error("Invalid search limit: {0} (must be between 1 and 1000)")]
    InvalidLimit(usize),
    #[error("Default categories cannot contain empty names")]
    EmptyCategory,
    #[error("Missing API key for {0} embedding provider")]
    MissingApiKey(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidEnvOverride { key: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl From<ConfigError> for RagError {
    #[inline]
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

impl Config {
    /// Default configuration directory for the current user
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("rag-index"))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from the directory, falling back to defaults, then apply
    /// environment overrides and validate.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .apply_env_overrides()
            .context("Invalid environment override")?;
        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the default configuration directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = Self::config_dir()?;
        Self::load(dir)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply the enumerated overrides using `lookup` to resolve variable names
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_VECTOR_STORE_URI) {
            self.vector_store.uri = Some(uri);
        }

        if let Some(provider) = lookup(ENV_EMBEDDING_PROVIDER) {
            self.embeddings.provider = match provider.trim().to_lowercase().as_str() {
                "openai" => EmbeddingProviderKind::OpenAi,
                "ollama" => EmbeddingProviderKind::Ollama,
                _ => {
                    return Err(ConfigError::InvalidEnvOverride {
                        key: ENV_EMBEDDING_PROVIDER.to_string(),
                        value: provider,
                    });
                }
            };
        }

        if let Some(base_url) = lookup(ENV_EMBEDDING_BASE_URL) {
            self.embeddings.base_url = base_url;
        }

        if let Some(model) = lookup(ENV_EMBEDDING_MODEL) {
            self.embeddings.model = model;
        }

        if let Some(dimension) = lookup(ENV_EMBEDDING_DIMENSION) {
            self.embeddings.dimension =
                dimension
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnvOverride {
                        key: ENV_EMBEDDING_DIMENSION.to_string(),
                        value: dimension.clone(),
                    })?;
        }

        if let Some(concurrency) = lookup(ENV_EMBEDDING_CONCURRENCY) {
            self.embeddings.max_concurrent_requests =
                concurrency
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnvOverride {
                        key: ENV_EMBEDDING_CONCURRENCY.to_string(),
                        value: concurrency.clone(),
                    })?;
        }

        // A key written to the config file wins over the ambient one
        if self.embeddings.api_key.is_none() {
            self.embeddings.api_key = lookup(ENV_OPENAI_API_KEY).filter(|k| !k.trim().is_empty());
        }

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vector_store.validate()?;
        self.embeddings.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// URI the vector store connects to
    #[inline]
    pub fn vector_store_uri(&self) -> String {
        self.vector_store.uri.clone().unwrap_or_else(|| {
            self.get_base_dir()
                .join("vectors")
                .to_string_lossy()
                .into_owned()
        })
    }
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ann_min_rows == 0 {
            return Err(ConfigError::InvalidAnnMinRows(self.ann_min_rows));
        }

        let HnswConfig { m, ef_construction } = self.hnsw;
        if !(2..=128).contains(&m) || !(8..=1024).contains(&ef_construction) {
            return Err(ConfigError::InvalidHnswParameters(m, ef_construction));
        }

        Ok(())
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(2..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if self.batch_size == 0 || self.batch_size > 2048 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=64).contains(&self.max_concurrent_requests) {
            return Err(ConfigError::InvalidConcurrency(
                self.max_concurrent_requests,
            ));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    /// Provider base URL with a trailing slash, so relative endpoint paths keep any
    /// proxy prefix
    pub fn url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.default_limit) {
            return Err(ConfigError::InvalidLimit(self.default_limit));
        }

        if self.default_categories.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::EmptyCategory);
        }

        Ok(())
    }
}
