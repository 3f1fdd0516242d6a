// Deterministic embedder and fault-injecting store for unit tests

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use crate::config::{Config, StoreBackend};
use crate::database::{
    CollectionSchema, Filter, IndexBuild, IndexSpec, InsertOutcome, MemoryVectorStore, NewRow,
    SearchHit, StoreError, StoredRow, VectorStore,
};
use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};

pub(crate) const TEST_DIMENSION: usize = 16;

/// Bag-of-words embedder: identical texts map to identical vectors and texts sharing
/// words land close together
#[derive(Debug, Default)]
pub(crate) struct HashEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl HashEmbedder {
    pub(crate) fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; TEST_DIMENSION];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % TEST_DIMENSION as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingProvider("provider offline".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

/// Memory store that can be told to fail specific operations
#[derive(Default)]
pub(crate) struct FaultyStore {
    pub inner: MemoryVectorStore,
    pub fail_index: Option<String>,
    /// Index reported as deferred on its first build and failing afterwards
    pub defer_index: Option<String>,
    pub deferred_once: AtomicBool,
    /// Index builds on this collection wait for a permit, one permit per build
    pub index_gate: Option<(String, Arc<Semaphore>)>,
    pub fail_search: AtomicBool,
    pub create_calls: AtomicUsize,
    pub index_calls: AtomicUsize,
}

impl FaultyStore {
    pub(crate) fn failing_index(name: &str) -> Self {
        Self {
            fail_index: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn deferring_index(name: &str) -> Self {
        Self {
            defer_index: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn gated(collection: &str, gate: Arc<Semaphore>) -> Self {
        Self {
            index_gate: Some((collection.to_string(), gate)),
            ..Self::default()
        }
    }
}

#[async_trait]
impl VectorStore for FaultyStore {
    async fn has_collection(&self, name: &str) -> std::result::Result<bool, StoreError> {
        self.inner.has_collection(name).await
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> std::result::Result<(), StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_collection(name, schema).await
    }

    async fn describe_collection(
        &self,
        name: &str,
    ) -> std::result::Result<CollectionSchema, StoreError> {
        self.inner.describe_collection(name).await
    }

    async fn create_index(
        &self,
        name: &str,
        index: &IndexSpec,
    ) -> std::result::Result<IndexBuild, StoreError> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, gate)) = self.index_gate.as_ref().filter(|(c, _)| c == name) {
            gate.acquire()
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .forget();
        }
        // Let concurrent builders interleave
        tokio::task::yield_now().await;

        if self.defer_index.as_deref() == Some(index.name.as_str()) {
            if self.deferred_once.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Backend(format!("cannot build {}", index.name)));
            }
            return Ok(IndexBuild::Deferred);
        }
        if self.fail_index.as_deref() == Some(index.name.as_str()) {
            return Err(StoreError::Backend(format!("cannot build {}", index.name)));
        }
        self.inner.create_index(name, index).await
    }

    async fn list_indexes(&self, name: &str) -> std::result::Result<Vec<String>, StoreError> {
        self.inner.list_indexes(name).await
    }

    async fn load_collection(&self, name: &str) -> std::result::Result<(), StoreError> {
        self.inner.load_collection(name).await
    }

    async fn release_collection(&self, name: &str) -> std::result::Result<(), StoreError> {
        self.inner.release_collection(name).await
    }

    async fn insert(
        &self,
        name: &str,
        rows: Vec<NewRow>,
    ) -> std::result::Result<InsertOutcome, StoreError> {
        self.inner.insert(name, rows).await
    }

    async fn query(
        &self,
        name: &str,
        filter: &Filter,
    ) -> std::result::Result<Vec<StoredRow>, StoreError> {
        self.inner.query(name, filter).await
    }

    async fn delete(&self, name: &str, ids: &[i64]) -> std::result::Result<u64, StoreError> {
        self.inner.delete(name, ids).await
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> std::result::Result<Vec<SearchHit>, StoreError> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("search node unreachable".to_string()));
        }
        self.inner.search(name, vector, filter, limit).await
    }

    async fn count_rows(&self, name: &str) -> std::result::Result<u64, StoreError> {
        self.inner.count_rows(name).await
    }
}

pub(crate) fn memory_config() -> Config {
    let mut config = Config::default();
    config.vector_store.backend = StoreBackend::Memory;
    config.embeddings.dimension = TEST_DIMENSION as u32;
    config
}

pub(crate) fn hash_embedder() -> Arc<HashEmbedder> {
    Arc::new(HashEmbedder::default())
}
