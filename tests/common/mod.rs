#![allow(dead_code, reason = "each test binary uses a different subset")]

// Shared fixtures for integration tests

use async_trait::async_trait;
use rag_index::config::{Config, EmbeddingProviderKind, StoreBackend};
use rag_index::database::create_store;
use rag_index::embeddings::EmbeddingProvider;
use rag_index::indexer::Chunk;
use rag_index::{Engine, Result};
use serde_json::{Value, json};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::{Request, Respond, ResponseTemplate};

pub const DIMENSION: usize = 32;

/// Bag-of-words vector: shared words pull texts together, identical texts coincide
pub fn word_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIMENSION];
    for word in text.split_whitespace() {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

pub struct WordEmbedder;

#[async_trait]
impl EmbeddingProvider for WordEmbedder {
    fn model(&self) -> &str {
        "bag-of-words"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| word_vector(t)).collect())
    }
}

/// Answers Ollama `/api/embed` requests with [`word_vector`] embeddings
pub struct OllamaEmbedResponder;

impl Respond for OllamaEmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|text| word_vector(text.as_str().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "model": body["model"],
            "embeddings": embeddings
        }))
    }
}

/// LanceDB-backed configuration rooted in a temporary directory
pub fn lance_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.vector_store.backend = StoreBackend::LanceDb;
    config.embeddings.provider = EmbeddingProviderKind::Ollama;
    config.embeddings.base_url = "http://localhost:11434".to_string();
    config.embeddings.model = "nomic-embed-text".to_string();
    config.embeddings.dimension = DIMENSION as u32;
    (config, temp_dir)
}

pub async fn lance_engine(config: Config) -> Engine {
    let store = create_store(&config).await.expect("should open store");
    Engine::with_components(config, store, Arc::new(WordEmbedder)).expect("should assemble")
}

pub fn chunk(text: &str, file_id: i64, category: &str) -> Chunk {
    Chunk::new(text)
        .with_metadata("file_id", file_id)
        .with_metadata("filename", format!("report_{file_id}.pdf"))
        .with_metadata("filetype", "application/pdf")
        .with_metadata("category", category)
}
