
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::collections::CollectionManager;
use super::locks::FileLocks;
use crate::Result;
use crate::database::{Filter, VectorStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub collection: String,
    pub file_id: i64,
    pub deleted: u64,
}

/// Removes every row of a source document from a collection
pub struct IndexMaintenance {
    store: Arc<dyn VectorStore>,
    collections: Arc<CollectionManager>,
    locks: Arc<FileLocks>,
}

impl IndexMaintenance {
    #[inline]
    pub fn new(
        store: Arc<dyn VectorStore>,
        collections: Arc<CollectionManager>,
        locks: Arc<FileLocks>,
    ) -> Self {
        Self {
            store,
            collections,
            locks,
        }
    }

    /// Delete all rows whose `file_id` matches.
    ///
    /// Removing a file with no rows succeeds with `deleted == 0`. A missing collection
    /// fails with [`crate::RagError::CollectionNotFound`].
    #[instrument(skip(self))]
    pub async fn remove_file_index(
        &self,
        collection: &str,
        file_id: i64,
    ) -> Result<RemovalReport> {
        let _file = self.locks.lock(collection, file_id).await;

        self.collections.load(collection).await?;

        let rows = self
            .store
            .query(collection, &Filter::all().with_file_id(file_id))
            .await?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let deleted = if ids.is_empty() {
            debug!("No rows for file {} in {}", file_id, collection);
            0
        } else {
            self.store.delete(collection, &ids).await?
        };

        info!("Removed {} rows of file {} from {}", deleted, file_id, collection);
        Ok(RemovalReport {
            collection: collection.to_string(),
            file_id,
            deleted,
        })
    }
}
