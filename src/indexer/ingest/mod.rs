
use futures::future::join_all;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::chunk::Chunk;
use super::document::{DocumentIndexer, IndexReport};
use super::maintenance::{IndexMaintenance, RemovalReport};
use crate::database::schema::fields;
use crate::{RagError, Result};

pub const ARTIFACTS_COLLECTION: &str = "artifacts";

/// Collections a document is indexed into: the global one plus its board and owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionTarget {
    Artifacts,
    Board(i64),
    User(i64),
}

impl CollectionTarget {
    /// `artifacts`, then the board and user collections when given
    #[inline]
    pub fn for_file(board_id: Option<i64>, user_id: Option<i64>) -> Vec<Self> {
        std::iter::once(Self::Artifacts)
            .chain(board_id.map(Self::Board))
            .chain(user_id.map(Self::User))
            .collect()
    }

    #[inline]
    pub fn collection_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CollectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artifacts => f.write_str(ARTIFACTS_COLLECTION),
            Self::Board(id) => write!(f, "board_{}", id),
            Self::User(id) => write!(f, "user_{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub file_id: i64,
    pub board_id: Option<i64>,
    pub user_id: Option<i64>,
    pub chunks: Vec<Chunk>,
}

/// Result of one collection in a fan-out
#[derive(Debug)]
pub struct CollectionOutcome<T> {
    pub collection: String,
    pub result: Result<T>,
}

#[derive(Debug)]
pub struct IngestReport {
    pub job_id: Uuid,
    pub outcomes: Vec<CollectionOutcome<IndexReport>>,
}

impl IngestReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    #[inline]
    pub fn failures(&self) -> impl Iterator<Item = (&str, &RagError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.collection.as_str(), e)))
    }
}

/// Ingestion entry point for upstream collaborators: fans a document out to its
/// collections and joins every per-collection result before returning
pub struct IngestionService {
    indexer: Arc<DocumentIndexer>,
    maintenance: Arc<IndexMaintenance>,
}

impl IngestionService {
    #[inline]
    pub fn new(indexer: Arc<DocumentIndexer>, maintenance: Arc<IndexMaintenance>) -> Self {
        Self {
            indexer,
            maintenance,
        }
    }

    /// Stamp every chunk with the owning file and uploader
    fn attribute(request: &IngestRequest) -> Vec<Chunk> {
        let owners: Vec<i64> = request.user_id.into_iter().collect();
        request
            .chunks
            .iter()
            .cloned()
            .map(|mut chunk| {
                chunk
                    .metadata
                    .insert(fields::FILE_ID.to_string(), Value::from(request.file_id));
                chunk
                    .metadata
                    .insert(fields::USER_ID.to_string(), Value::from(owners.clone()));
                chunk
            })
            .collect()
    }

    #[instrument(skip(self, request), fields(file_id = request.file_id))]
    pub async fn ingest(&self, request: IngestRequest) -> IngestReport {
        let job_id = Uuid::new_v4();
        let chunks = Self::attribute(&request);
        let targets = CollectionTarget::for_file(request.board_id, request.user_id);

        let jobs = targets.iter().map(|target| {
            let collection = target.collection_name();
            let chunks = chunks.clone();
            async move {
                let result = self.indexer.index_document(&collection, chunks).await;
                CollectionOutcome { collection, result }
            }
        });
        let outcomes = join_all(jobs).await;

        let report = IngestReport { job_id, outcomes };
        for (collection, error) in report.failures() {
            warn!("Ingestion job {} failed for {}: {}", job_id, collection, error);
        }
        info!(
            "Ingestion job {} for file {} finished: {}/{} collections succeeded",
            job_id,
            request.file_id,
            report.outcomes.iter().filter(|o| o.result.is_ok()).count(),
            report.outcomes.len()
        );
        report
    }

    /// Remove a file from every collection it was ingested into
    #[instrument(skip(self))]
    pub async fn remove(
        &self,
        file_id: i64,
        board_id: Option<i64>,
        user_id: Option<i64>,
    ) -> Vec<CollectionOutcome<RemovalReport>> {
        let targets = CollectionTarget::for_file(board_id, user_id);
        let jobs = targets.iter().map(|target| {
            let collection = target.collection_name();
            async move {
                let result = self
                    .maintenance
                    .remove_file_index(&collection, file_id)
                    .await;
                CollectionOutcome { collection, result }
            }
        });
        join_all(jobs).await
    }

    /// Replace a file's rows: remove from every target, then ingest again. Also the
    /// compensating action after an interrupted ingestion.
    #[instrument(skip(self, request), fields(file_id = request.file_id))]
    pub async fn reindex(&self, request: IngestRequest) -> Result<IngestReport> {
        let removals = self
            .remove(request.file_id, request.board_id, request.user_id)
            .await;

        for outcome in removals {
            match outcome.result {
                Ok(_) | Err(RagError::CollectionNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(self.ingest(request).await)
    }
}
