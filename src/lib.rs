use thiserror::Error;

use crate::indexer::RejectedRow;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Schema inconsistency in collection '{collection}': {reason}")]
    SchemaInconsistency { collection: String, reason: String },

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error(
        "Partial insert into '{collection}': {} rows inserted, {} rows rejected",
        inserted.len(),
        rejected.len()
    )]
    PartialInsert {
        collection: String,
        inserted: Vec<i64>,
        rejected: Vec<RejectedRow>,
    },

    #[error("Search unavailable for collection '{collection}': {reason}")]
    SearchUnavailable { collection: String, reason: String },

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod engine;
pub mod indexer;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::Engine;
