// Engine module
// Builds the store, embedder and components from one configuration


use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::Config;
use crate::database::{VectorStore, create_store};
use crate::embeddings::{EmbeddingProvider, create_provider};
use crate::indexer::{
    Chunk, CollectionManager, CollectionOutcome, CollectionState, DocumentIndexer,
    EnsureOutcome, FileLocks, IndexMaintenance, IndexReport, IngestReport, IngestRequest,
    IngestionService, MetadataPolicy, RemovalReport,
};
use crate::retrieval::{RetrievalEngine, RetrievedChunk, RetrievedContext, SearchOptions};
use crate::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStatus {
    pub name: String,
    pub state: String,
    pub rows: Option<u64>,
    pub indexes: Vec<String>,
}

/// Indexing and retrieval engine over one vector store and one embedding model
pub struct Engine {
    config: Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    collections: Arc<CollectionManager>,
    indexer: Arc<DocumentIndexer>,
    maintenance: Arc<IndexMaintenance>,
    retrieval: RetrievalEngine,
    ingestion: IngestionService,
}

impl Engine {
    /// Connect the configured store and embedding provider
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let store = create_store(&config).await?;
        let embedder = create_provider(&config)?;
        Self::with_components(config, store, embedder)
    }

    /// Assemble an engine around an existing store and provider. The provider must
    /// produce vectors of the configured width.
    #[inline]
    pub fn with_components(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let dimension = config.embeddings.dimension as usize;
        if embedder.dimension() != dimension {
            return Err(RagError::Config(format!(
                "embedding model {} produces {} dimensions, configuration expects {}",
                embedder.model(),
                embedder.dimension(),
                dimension
            )));
        }

        let collections = Arc::new(CollectionManager::new(
            Arc::clone(&store),
            dimension,
            config.vector_store.hnsw,
        ));
        let locks = Arc::new(FileLocks::new());
        let indexer = Arc::new(DocumentIndexer::new(
            Arc::clone(&store),
            Arc::clone(&collections),
            Arc::clone(&embedder),
            Arc::clone(&locks),
            MetadataPolicy::new(config.indexing.allowed_extra_fields.iter().cloned()),
        ));
        let maintenance = Arc::new(IndexMaintenance::new(
            Arc::clone(&store),
            Arc::clone(&collections),
            locks,
        ));
        let retrieval = RetrievalEngine::new(
            Arc::clone(&store),
            Arc::clone(&collections),
            Arc::clone(&embedder),
        );
        let ingestion = IngestionService::new(Arc::clone(&indexer), Arc::clone(&maintenance));

        info!(
            "Engine ready: model {} ({} dimensions)",
            embedder.model(),
            dimension
        );
        Ok(Self {
            config,
            store,
            embedder,
            collections,
            indexer,
            maintenance,
            retrieval,
            ingestion,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    #[inline]
    pub fn collections(&self) -> &CollectionManager {
        &self.collections
    }

    #[inline]
    pub fn ingestion(&self) -> &IngestionService {
        &self.ingestion
    }

    #[inline]
    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    /// Search options from the retrieval defaults
    #[inline]
    pub fn default_search_options(&self) -> SearchOptions {
        SearchOptions::from_config(&self.config.retrieval)
    }

    #[inline]
    pub async fn ensure_collection(&self, collection: &str) -> Result<EnsureOutcome> {
        self.collections.ensure_collection(collection).await
    }

    #[inline]
    pub async fn index_document(&self, collection: &str, chunks: Vec<Chunk>) -> Result<IndexReport> {
        self.indexer.index_document(collection, chunks).await
    }

    #[inline]
    pub async fn remove_file_index(&self, collection: &str, file_id: i64) -> Result<RemovalReport> {
        self.maintenance.remove_file_index(collection, file_id).await
    }

    #[inline]
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        self.retrieval.search(collection, query, options).await
    }

    #[inline]
    pub async fn retrieve_context(
        &self,
        collection: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<RetrievedContext> {
        self.retrieval
            .retrieve_context(collection, query, options)
            .await
    }

    #[inline]
    pub async fn ingest(&self, request: IngestRequest) -> IngestReport {
        self.ingestion.ingest(request).await
    }

    #[inline]
    pub async fn remove(
        &self,
        file_id: i64,
        board_id: Option<i64>,
        user_id: Option<i64>,
    ) -> Vec<CollectionOutcome<RemovalReport>> {
        self.ingestion.remove(file_id, board_id, user_id).await
    }

    #[inline]
    pub async fn reindex(&self, request: IngestRequest) -> Result<IngestReport> {
        self.ingestion.reindex(request).await
    }

    #[inline]
    pub async fn release(&self, collection: &str) -> Result<()> {
        self.collections.release(collection).await
    }

    #[instrument(skip(self))]
    pub async fn status(&self, collection: &str) -> Result<CollectionStatus> {
        let state = self.collections.state(collection).await?;
        let (rows, indexes) = if state == CollectionState::Absent {
            (None, Vec::new())
        } else {
            (
                Some(self.store.count_rows(collection).await?),
                self.store.list_indexes(collection).await?,
            )
        };

        Ok(CollectionStatus {
            name: collection.to_string(),
            state: state.to_string(),
            rows,
            indexes,
        })
    }
}
