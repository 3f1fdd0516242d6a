// Retrieval module
// Query embedding, filtered similarity search and provenance for citations


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::RetrievalConfig;
use crate::database::{Filter, SearchHit, StoreError, VectorStore};
use crate::embeddings::EmbeddingProvider;
use crate::indexer::CollectionManager;
use crate::{RagError, Result};

/// Which chunk categories a search may return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryFilter {
    Any,
    OneOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub categories: CategoryFilter,
    pub file_id: Option<i64>,
    pub limit: usize,
}

impl SearchOptions {
    /// Configured default categories and limit, no file restriction
    #[inline]
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            categories: CategoryFilter::OneOf(config.default_categories.clone()),
            file_id: None,
            limit: config.default_limit,
        }
    }

    #[inline]
    pub fn with_file_id(mut self, file_id: i64) -> Self {
        self.file_id = Some(file_id);
        self
    }

    #[inline]
    pub fn with_categories(mut self, categories: CategoryFilter) -> Self {
        self.categories = categories;
        self
    }

    #[inline]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn filter(&self) -> Filter {
        let filter = match &self.categories {
            CategoryFilter::Any => Filter::all(),
            CategoryFilter::OneOf(categories) => {
                Filter::all().with_categories(categories.iter().map(String::as_str))
            }
        };
        match self.file_id {
            Some(file_id) => filter.with_file_id(file_id),
            None => filter,
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub filename: String,
    pub page_number: i32,
}

/// One search hit, closest first in result lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: Provenance,
    pub file_id: i64,
    pub category: String,
    /// Squared L2 distance to the query
    pub distance: f32,
}

impl From<SearchHit> for RetrievedChunk {
    fn from(hit: SearchHit) -> Self {
        Self {
            content: hit.row.text,
            metadata: Provenance {
                filename: hit.row.filename,
                page_number: hit.row.page_number,
            },
            file_id: hit.row.file_id,
            category: hit.row.category,
            distance: hit.distance,
        }
    }
}

/// Filenames cited by a result list, first occurrence order, blanks skipped
#[inline]
pub fn unique_sources(chunks: &[RetrievedChunk]) -> Vec<String> {
    chunks
        .iter()
        .map(|c| c.metadata.filename.as_str())
        .filter(|f| !f.is_empty())
        .unique()
        .map(str::to_string)
        .collect()
}

/// Retrieved chunks and their sources, ready to hand to an answerer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub chunks: Vec<RetrievedChunk>,
    pub sources: Vec<String>,
}

impl fmt::Display for RetrievedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chunks.iter().map(|c| &c.content).join("\n\n"))?;
        if !self.sources.is_empty() {
            write!(f, "\nSources: {}", self.sources.join(","))?;
        }
        Ok(())
    }
}

pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    collections: Arc<CollectionManager>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RetrievalEngine {
    #[inline]
    pub fn new(
        store: Arc<dyn VectorStore>,
        collections: Arc<CollectionManager>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            collections,
            embedder,
        }
    }

    fn unavailable(collection: &str, reason: impl fmt::Display) -> RagError {
        RagError::SearchUnavailable {
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Rank chunks of `collection` by distance to `query`.
    ///
    /// The collection is reloaded on every call. An empty list means nothing matched;
    /// store failures are [`RagError::SearchUnavailable`].
    #[instrument(skip(self, options), fields(limit = options.limit))]
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        if options.limit == 0 {
            return Err(RagError::Config(
                "search limit must be at least 1".to_string(),
            ));
        }

        match self.collections.load(collection).await {
            Ok(()) => {}
            Err(e @ (RagError::CollectionNotFound(_) | RagError::InvalidCollectionName(_))) => {
                return Err(e);
            }
            Err(e) => return Err(Self::unavailable(collection, e)),
        }

        let vector = self.embedder.embed(query).await?;

        let hits = self
            .store
            .search(collection, &vector, &options.filter(), options.limit)
            .await
            .map_err(|e| match e {
                StoreError::CollectionNotFound(name) => RagError::CollectionNotFound(name),
                other => {
                    warn!("Search on {} failed: {}", collection, other);
                    Self::unavailable(collection, other)
                }
            })?;

        debug!("Search on {} returned {} chunks", collection, hits.len());
        Ok(hits.into_iter().map(RetrievedChunk::from).collect())
    }

    /// Search and collect the cited sources
    #[inline]
    pub async fn retrieve_context(
        &self,
        collection: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<RetrievedContext> {
        let chunks = self.search(collection, query, options).await?;
        let sources = unique_sources(&chunks);
        Ok(RetrievedContext { chunks, sources })
    }
}
