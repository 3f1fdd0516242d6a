// LanceDB vector database backend
// One Lance table per collection, schema declared explicitly in Arrow

#[cfg(test)]
mod tests;

mod batch;

use arrow::array::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::index::Index;
use lancedb::index::scalar::{BTreeIndexBuilder, BitmapIndexBuilder};
use lancedb::index::vector::IvfHnswSqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::schema::{IndexKind, Metric, fields};
use super::{
    CollectionSchema, Filter, IdAllocator, IndexBuild, IndexSpec, InsertOutcome, NewRow,
    SearchHit, StoreError, StoredRow, VectorStore,
};
use crate::config::Config;

/// Ids per `IN (...)` predicate when deleting
const DELETE_BATCH_SIZE: usize = 1000;

/// Vector store backed by LanceDB tables
pub struct LanceVectorStore {
    connection: Connection,
    loaded: RwLock<HashMap<String, Table>>,
    ids: IdAllocator,
    id_floor_checked: Mutex<HashSet<String>>,
    ann_min_rows: usize,
}

fn db_err(action: &str, error: impl Display) -> StoreError {
    StoreError::Backend(format!("Failed to {}: {}", action, error))
}

impl LanceVectorStore {
    /// Connect to the LanceDB database at the configured URI
    ///
    /// # Arguments
    /// * `config` - Application configuration containing the store URI
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, StoreError> {
        let uri = config.vector_store_uri();
        Self::connect(&uri, config.vector_store.ann_min_rows).await
    }

    #[inline]
    pub async fn connect(uri: &str, ann_min_rows: usize) -> Result<Self, StoreError> {
        debug!("Connecting to LanceDB at {}", uri);

        // Local paths need their directory to exist; remote URIs carry a scheme
        if !uri.contains("://") {
            std::fs::create_dir_all(Path::new(uri))
                .map_err(|e| db_err("create vector database directory", e))?;
        }

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| db_err("connect to LanceDB", e))?;

        info!("Vector store connected at {}", uri);
        Ok(Self {
            connection,
            loaded: RwLock::new(HashMap::new()),
            ids: IdAllocator::new(),
            id_floor_checked: Mutex::new(HashSet::new()),
            ann_min_rows: ann_min_rows.max(1),
        })
    }

    async fn open_table(&self, name: &str) -> Result<Table, StoreError> {
        match self.connection.open_table(name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                Err(StoreError::CollectionNotFound(name.to_string()))
            }
            Err(e) => Err(db_err("open table", e)),
        }
    }

    /// Handle for a collection that has been loaded
    async fn loaded_table(&self, name: &str) -> Result<Table, StoreError> {
        let cached = self
            .loaded
            .read()
            .map_err(|e| db_err("read table cache", e))?
            .get(name)
            .cloned();

        match cached {
            Some(table) => Ok(table),
            None if self.has_collection(name).await? => {
                Err(StoreError::NotLoaded(name.to_string()))
            }
            None => Err(StoreError::CollectionNotFound(name.to_string())),
        }
    }

    /// Raise the id allocator past the largest id already stored in the table, once
    /// per table and process
    async fn ensure_id_floor(&self, name: &str, table: &Table) -> Result<(), StoreError> {
        let already_checked = self
            .id_floor_checked
            .lock()
            .map_err(|e| db_err("lock id floor set", e))?
            .contains(name);
        if already_checked {
            return Ok(());
        }

        let mut stream = table
            .query()
            .select(Select::columns(&[fields::ID]))
            .execute()
            .await
            .map_err(|e| db_err("scan ids", e))?;

        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| db_err("read id stream", e))?
        {
            if let Some(max) = batch::max_id(&batch)? {
                self.ids.observe(max);
            }
        }

        self.id_floor_checked
            .lock()
            .map_err(|e| db_err("lock id floor set", e))?
            .insert(name.to_string());
        Ok(())
    }

    async fn collect_rows(
        mut stream: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<(StoredRow, Option<f32>)>, StoreError> {
        let mut rows = Vec::new();
        while let Some(record_batch) = stream
            .try_next()
            .await
            .map_err(|e| db_err("read result stream", e))?
        {
            rows.extend(batch::parse_rows(&record_batch)?);
        }
        Ok(rows)
    }

    fn build_index(&self, index: &IndexSpec, row_count: usize) -> Index {
        match index.kind {
            IndexKind::Scalar if index.field == fields::CATEGORY => {
                Index::Bitmap(BitmapIndexBuilder::default())
            }
            IndexKind::Scalar => Index::BTree(BTreeIndexBuilder::default()),
            IndexKind::Hnsw {
                metric: Metric::L2,
                m,
                ef_construction,
            } => {
                let partitions = ((row_count as f64).sqrt() as u32).clamp(1, 256);
                Index::IvfHnswSq(
                    IvfHnswSqIndexBuilder::default()
                        .distance_type(DistanceType::L2)
                        .num_partitions(partitions)
                        .num_edges(m)
                        .ef_construction(ef_construction),
                )
            }
        }
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_err("list tables", e))?;
        Ok(table_names.iter().any(|t| t == name))
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError> {
        if self.has_collection(name).await? {
            return Err(StoreError::CollectionExists(name.to_string()));
        }

        let arrow_schema = batch::arrow_schema(schema)?;
        self.connection
            .create_empty_table(name, arrow_schema)
            .execute()
            .await
            .map_err(|e| db_err("create table", e))?;

        info!("Created collection {}", name);
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema, StoreError> {
        let table = self.open_table(name).await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| db_err("get table schema", e))?;
        batch::collection_schema(&schema)
    }

    async fn create_index(&self, name: &str, index: &IndexSpec) -> Result<IndexBuild, StoreError> {
        let table = self.open_table(name).await?;
        let row_count = table
            .count_rows(None)
            .await
            .map_err(|e| db_err("count rows", e))?;

        // Lance trains indexes from existing data
        let required = match index.kind {
            IndexKind::Scalar => 1,
            IndexKind::Hnsw { .. } => self.ann_min_rows,
        };
        if row_count < required {
            debug!(
                "Deferring index {} on {} ({} of {} rows)",
                index.name, name, row_count, required
            );
            return Ok(IndexBuild::Deferred);
        }

        table
            .create_index(&[index.field.as_str()], self.build_index(index, row_count))
            .name(index.name.clone())
            .execute()
            .await
            .map_err(|e| db_err(&format!("create index {}", index.name), e))?;

        info!("Built index {} on {}.{}", index.name, name, index.field);
        Ok(IndexBuild::Built)
    }

    async fn list_indexes(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let table = self.open_table(name).await?;
        let indices = table
            .list_indices()
            .await
            .map_err(|e| db_err("list indexes", e))?;
        Ok(indices.into_iter().map(|i| i.name).collect())
    }

    async fn load_collection(&self, name: &str) -> Result<(), StoreError> {
        let table = self.open_table(name).await?;
        self.loaded
            .write()
            .map_err(|e| db_err("write table cache", e))?
            .insert(name.to_string(), table);
        debug!("Loaded collection {}", name);
        Ok(())
    }

    async fn release_collection(&self, name: &str) -> Result<(), StoreError> {
        let removed = self
            .loaded
            .write()
            .map_err(|e| db_err("write table cache", e))?
            .remove(name);

        if removed.is_none() && !self.has_collection(name).await? {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        debug!("Released collection {}", name);
        Ok(())
    }

    async fn insert(&self, name: &str, rows: Vec<NewRow>) -> Result<InsertOutcome, StoreError> {
        let table = self.open_table(name).await?;
        let arrow_schema = table
            .schema()
            .await
            .map_err(|e| db_err("get table schema", e))?;
        let schema = batch::collection_schema(&arrow_schema)?;

        let mut outcome = InsertOutcome::default();
        let mut accepted = Vec::with_capacity(rows.len());
        for (position, row) in rows.into_iter().enumerate() {
            match schema.validate_row(&row) {
                Ok(()) => accepted.push(row),
                Err(reason) => {
                    warn!("Rejected row {} for {}: {}", position, name, reason);
                    outcome.rejected.push((position, reason));
                }
            }
        }

        if accepted.is_empty() {
            return Ok(outcome);
        }

        self.ensure_id_floor(name, &table).await?;
        let first_id = self.ids.reserve(accepted.len());
        let ids: Vec<i64> = (first_id..).take(accepted.len()).collect();

        let record_batch = batch::build_record_batch(&arrow_schema, &schema, &ids, &accepted)?;
        let batch_schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), batch_schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| db_err("insert rows", e))?;

        debug!("Stored {} rows in {}", ids.len(), name);
        outcome.ids = ids;
        Ok(outcome)
    }

    async fn query(&self, name: &str, filter: &Filter) -> Result<Vec<StoredRow>, StoreError> {
        let table = self.loaded_table(name).await?;

        let mut query = table.query().select(Select::columns(batch::ROW_COLUMNS));
        if let Some(predicate) = filter.to_sql() {
            query = query.only_if(predicate);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| db_err("execute query", e))?;
        let rows = Self::collect_rows(stream).await?;
        Ok(rows.into_iter().map(|(row, _)| row).collect())
    }

    async fn delete(&self, name: &str, ids: &[i64]) -> Result<u64, StoreError> {
        let table = self.loaded_table(name).await?;
        let mut deleted = 0u64;

        for chunk in ids.chunks(DELETE_BATCH_SIZE) {
            let list = chunk
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let predicate = format!("{} IN ({})", fields::ID, list);

            let matching = table
                .count_rows(Some(predicate.clone()))
                .await
                .map_err(|e| db_err("count rows to delete", e))?;
            if matching == 0 {
                continue;
            }

            table
                .delete(&predicate)
                .await
                .map_err(|e| db_err("delete rows", e))?;
            deleted += matching as u64;
        }

        debug!("Deleted {} rows from {}", deleted, name);
        Ok(deleted)
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let table = self.loaded_table(name).await?;

        let mut query = table
            .vector_search(vector)
            .map_err(|e| db_err("create vector search", e))?
            .column(fields::VECTOR)
            .distance_type(DistanceType::L2)
            .select(Select::columns(batch::ROW_COLUMNS))
            .limit(limit);

        if let Some(predicate) = filter.to_sql() {
            query = query.only_if(predicate);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| db_err("execute search", e))?;

        let mut hits: Vec<SearchHit> = Self::collect_rows(stream)
            .await?
            .into_iter()
            .map(|(row, distance)| SearchHit {
                row,
                distance: distance.unwrap_or(0.0),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        debug!("Search on {} returned {} hits", name, hits.len());
        Ok(hits)
    }

    async fn count_rows(&self, name: &str) -> Result<u64, StoreError> {
        let table = self.open_table(name).await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| db_err("count rows", e))?;
        Ok(count as u64)
    }
}
