// Vector database module
// Store abstraction shared by the LanceDB and in-process backends

pub mod filter;
pub mod ids;
pub mod lancedb;
pub mod memory;
pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::RagError;
use crate::config::{Config, StoreBackend};

pub use filter::Filter;
pub use ids::IdAllocator;
pub use lancedb::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use schema::{CollectionSchema, FieldSpec, FieldType, IndexKind, IndexSpec};

/// A row ready to be written; the store assigns its `id`
#[derive(Debug, Clone, PartialEq)]
pub struct NewRow {
    pub text: String,
    pub vector: Vec<f32>,
    pub file_id: i64,
    pub filename: String,
    pub filetype: String,
    pub page_number: i32,
    pub category: String,
    pub user_id: Vec<i64>,
}

/// A persisted row as returned by queries and searches (vector omitted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: i64,
    pub text: String,
    pub file_id: i64,
    pub filename: String,
    pub filetype: String,
    pub page_number: i32,
    pub category: String,
    pub user_id: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub row: StoredRow,
    /// Squared L2 distance to the query vector
    pub distance: f32,
}

/// Result of a bulk insert: ids of written rows in batch order, and the rows the
/// store refused with their batch position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub ids: Vec<i64>,
    pub rejected: Vec<(usize, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBuild {
    Built,
    /// The backend needs more rows before it can train this index
    Deferred,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),
    #[error("collection '{0}' already exists")]
    CollectionExists(String),
    #[error("collection '{0}' is not loaded")]
    NotLoaded(String),
    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for RagError {
    #[inline]
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::CollectionNotFound(name) => Self::CollectionNotFound(name),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Operations the engine consumes from a vector database.
///
/// `query`, `delete` and `search` only operate on loaded collections. `insert`
/// validates every row against the collection schema and writes the valid ones in a
/// single call.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn has_collection(&self, name: &str) -> Result<bool, StoreError>;

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError>;

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema, StoreError>;

    async fn create_index(&self, name: &str, index: &IndexSpec) -> Result<IndexBuild, StoreError>;

    /// Names of the indexes built on the collection
    async fn list_indexes(&self, name: &str) -> Result<Vec<String>, StoreError>;

    async fn load_collection(&self, name: &str) -> Result<(), StoreError>;

    async fn release_collection(&self, name: &str) -> Result<(), StoreError>;

    async fn insert(&self, name: &str, rows: Vec<NewRow>) -> Result<InsertOutcome, StoreError>;

    async fn query(&self, name: &str, filter: &Filter) -> Result<Vec<StoredRow>, StoreError>;

    /// Delete rows by primary key, returning how many were removed
    async fn delete(&self, name: &str, ids: &[i64]) -> Result<u64, StoreError>;

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;

    async fn count_rows(&self, name: &str) -> Result<u64, StoreError>;
}

/// Build the configured store backend
#[inline]
pub async fn create_store(config: &Config) -> Result<Arc<dyn VectorStore>, RagError> {
    let store: Arc<dyn VectorStore> = match config.vector_store.backend {
        StoreBackend::LanceDb => Arc::new(LanceVectorStore::new(config).await?),
        StoreBackend::Memory => Arc::new(MemoryVectorStore::new()),
    };
    Ok(store)
}
