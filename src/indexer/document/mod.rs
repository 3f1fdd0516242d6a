
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::chunk::{Chunk, ChunkRecord, MetadataPolicy};
use super::collections::CollectionManager;
use super::locks::FileLocks;
use crate::database::VectorStore;
use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};

/// A chunk the indexer could not store, by its position in the submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertedRow {
    pub position: usize,
    pub id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub collection: String,
    pub inserted: Vec<InsertedRow>,
    /// Chunks skipped for missing or empty text
    pub dropped: usize,
    pub rejected: Vec<RejectedRow>,
}

impl IndexReport {
    fn into_result(self) -> Result<Self> {
        if self.rejected.is_empty() {
            return Ok(self);
        }
        Err(RagError::PartialInsert {
            collection: self.collection,
            inserted: self.inserted.iter().map(|r| r.id).collect(),
            rejected: self.rejected,
        })
    }
}

/// Turns chunk batches into stored rows
pub struct DocumentIndexer {
    store: Arc<dyn VectorStore>,
    collections: Arc<CollectionManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    locks: Arc<FileLocks>,
    policy: MetadataPolicy,
}

impl DocumentIndexer {
    #[inline]
    pub fn new(
        store: Arc<dyn VectorStore>,
        collections: Arc<CollectionManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        locks: Arc<FileLocks>,
        policy: MetadataPolicy,
    ) -> Self {
        Self {
            store,
            collections,
            embedder,
            locks,
            policy,
        }
    }

    /// Index a batch of chunks into `collection`, creating it when absent.
    ///
    /// Chunks without text are dropped. Chunks whose metadata cannot be mapped onto
    /// the row layout, and rows the store refuses, are rejected individually; the
    /// others are still stored, and the call then fails with
    /// [`RagError::PartialInsert`] listing both.
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn index_document(
        &self,
        collection: &str,
        chunks: Vec<Chunk>,
    ) -> Result<IndexReport> {
        let mut report = IndexReport {
            collection: collection.to_string(),
            ..IndexReport::default()
        };

        let schema = self.collections.schema();
        let mut records: Vec<(usize, ChunkRecord)> = Vec::with_capacity(chunks.len());
        for (position, chunk) in chunks.iter().enumerate() {
            let Some(text) = chunk.indexable_text() else {
                report.dropped += 1;
                continue;
            };
            match self.policy.normalize(schema, text, &chunk.metadata) {
                Ok(record) => records.push((position, record)),
                Err(reason) => {
                    debug!("Chunk {} rejected: {}", position, reason);
                    report.rejected.push(RejectedRow { position, reason });
                }
            }
        }

        self.collections.ensure_collection(collection).await?;

        if records.is_empty() {
            debug!("Nothing to insert into {}", collection);
            return report.into_result();
        }

        let _files = self
            .locks
            .lock_many(collection, records.iter().map(|(_, r)| r.file_id))
            .await;

        let texts: Vec<String> = records.iter().map(|(_, r)| r.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != records.len() {
            return Err(RagError::EmbeddingProvider(format!(
                "expected {} vectors, provider returned {}",
                records.len(),
                vectors.len()
            )));
        }

        let positions: Vec<usize> = records.iter().map(|(p, _)| *p).collect();
        let rows = records
            .into_iter()
            .zip(vectors)
            .map(|((_, record), vector)| record.into_row(vector))
            .collect();

        let outcome = self.store.insert(collection, rows).await?;

        let refused: HashSet<usize> = outcome.rejected.iter().map(|(p, _)| *p).collect();
        let accepted = positions
            .iter()
            .enumerate()
            .filter(|(batch_position, _)| !refused.contains(batch_position))
            .map(|(_, position)| *position);
        report.inserted = accepted
            .zip(outcome.ids)
            .map(|(position, id)| InsertedRow { position, id })
            .collect();
        report
            .rejected
            .extend(outcome.rejected.into_iter().filter_map(|(batch_position, reason)| {
                positions
                    .get(batch_position)
                    .map(|position| RejectedRow {
                        position: *position,
                        reason,
                    })
            }));
        report.rejected.sort_by_key(|r| r.position);

        // Index builds deferred while the collection was empty can run now
        if let Err(e) = self.collections.reconcile_indexes(collection).await {
            warn!("Pending indexes on {} not built yet: {}", collection, e);
        }

        info!(
            "Indexed {} chunks into {} ({} dropped, {} rejected)",
            report.inserted.len(),
            collection,
            report.dropped,
            report.rejected.len()
        );
        report.into_result()
    }
}
