#[cfg(test)]
mod tests;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::{
    CollectionSchema, Filter, IdAllocator, IndexBuild, IndexSpec, InsertOutcome, NewRow,
    SearchHit, StoreError, StoredRow, VectorStore,
};

struct MemoryRow {
    row: StoredRow,
    vector: Vec<f32>,
}

struct MemoryCollection {
    schema: CollectionSchema,
    rows: BTreeMap<i64, MemoryRow>,
    indexes: Vec<String>,
    loaded: bool,
}

/// Process-local vector store with exact L2 search
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    ids: IdAllocator,
}

impl MemoryVectorStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemoryCollection>>, StoreError> {
        self.collections
            .read()
            .map_err(|e| StoreError::Backend(format!("Memory store lock poisoned: {}", e)))
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, MemoryCollection>>, StoreError> {
        self.collections
            .write()
            .map_err(|e| StoreError::Backend(format!("Memory store lock poisoned: {}", e)))
    }

    fn with_loaded<T>(
        &self,
        name: &str,
        f: impl FnOnce(&MemoryCollection) -> T,
    ) -> Result<T, StoreError> {
        let collections = self.read()?;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        if !collection.loaded {
            return Err(StoreError::NotLoaded(name.to_string()));
        }
        Ok(f(collection))
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError> {
        let mut collections = self.write()?;
        if collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                schema: schema.clone(),
                rows: BTreeMap::new(),
                indexes: Vec::new(),
                loaded: false,
            },
        );
        debug!("Created in-memory collection {}", name);
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema, StoreError> {
        self.read()?
            .get(name)
            .map(|c| c.schema.clone())
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    async fn create_index(&self, name: &str, index: &IndexSpec) -> Result<IndexBuild, StoreError> {
        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        if collection.schema.field(&index.field).is_none() {
            return Err(StoreError::Backend(format!(
                "cannot index unknown field '{}'",
                index.field
            )));
        }
        if !collection.indexes.contains(&index.name) {
            collection.indexes.push(index.name.clone());
        }
        Ok(IndexBuild::Built)
    }

    async fn list_indexes(&self, name: &str) -> Result<Vec<String>, StoreError> {
        self.read()?
            .get(name)
            .map(|c| c.indexes.clone())
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    async fn load_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        collection.loaded = true;
        Ok(())
    }

    async fn release_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        collection.loaded = false;
        Ok(())
    }

    async fn insert(&self, name: &str, rows: Vec<NewRow>) -> Result<InsertOutcome, StoreError> {
        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        let mut outcome = InsertOutcome::default();
        let mut accepted = Vec::with_capacity(rows.len());
        for (position, row) in rows.into_iter().enumerate() {
            match collection.schema.validate_row(&row) {
                Ok(()) => accepted.push(row),
                Err(reason) => outcome.rejected.push((position, reason)),
            }
        }

        if accepted.is_empty() {
            return Ok(outcome);
        }

        let first_id = self.ids.reserve(accepted.len());
        for (id, row) in (first_id..).zip(accepted) {
            collection.rows.insert(
                id,
                MemoryRow {
                    row: StoredRow {
                        id,
                        text: row.text,
                        file_id: row.file_id,
                        filename: row.filename,
                        filetype: row.filetype,
                        page_number: row.page_number,
                        category: row.category,
                        user_id: row.user_id,
                    },
                    vector: row.vector,
                },
            );
            outcome.ids.push(id);
        }

        debug!("Inserted {} rows into {}", outcome.ids.len(), name);
        Ok(outcome)
    }

    async fn query(&self, name: &str, filter: &Filter) -> Result<Vec<StoredRow>, StoreError> {
        self.with_loaded(name, |collection| {
            collection
                .rows
                .values()
                .filter(|r| filter.matches(&r.row))
                .map(|r| r.row.clone())
                .collect()
        })
    }

    async fn delete(&self, name: &str, ids: &[i64]) -> Result<u64, StoreError> {
        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        if !collection.loaded {
            return Err(StoreError::NotLoaded(name.to_string()));
        }

        let deleted = ids
            .iter()
            .filter(|id| collection.rows.remove(id).is_some())
            .count();
        Ok(deleted as u64)
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let hits = self.with_loaded(name, |collection| {
            if collection.schema.vector_dimension() != Some(vector.len()) {
                return Err(StoreError::Backend(format!(
                    "query vector has {} dimensions, collection expects {:?}",
                    vector.len(),
                    collection.schema.vector_dimension()
                )));
            }

            let mut hits: Vec<SearchHit> = collection
                .rows
                .values()
                .filter(|r| filter.matches(&r.row))
                .map(|r| SearchHit {
                    row: r.row.clone(),
                    distance: squared_l2(vector, &r.vector),
                })
                .collect();
            hits.sort_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then(a.row.id.cmp(&b.row.id))
            });
            hits.truncate(limit);
            Ok(hits)
        })??;

        Ok(hits)
    }

    async fn count_rows(&self, name: &str) -> Result<u64, StoreError> {
        self.read()?
            .get(name)
            .map(|c| c.rows.len() as u64)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }
}
