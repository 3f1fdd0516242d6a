
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::{debug, info, instrument, warn};

use crate::config::HnswConfig;
use crate::database::{CollectionSchema, IndexBuild, IndexSpec, StoreError, VectorStore};
use crate::{RagError, Result};

const MAX_COLLECTION_NAME_LENGTH: usize = 255;

/// Lifecycle of a collection as seen by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    Absent,
    Created,
    Loaded,
    Released,
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Created => "created",
            Self::Loaded => "loaded",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Existing,
}

/// Collection names are identifiers: a letter or underscore, then letters, digits or
/// underscores
#[inline]
pub fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > MAX_COLLECTION_NAME_LENGTH {
        return Err(RagError::InvalidCollectionName(name.to_string()));
    }
    Ok(())
}

/// Creates collections with the chunk layout and owns every load/release transition
pub struct CollectionManager {
    store: Arc<dyn VectorStore>,
    schema: CollectionSchema,
    hnsw: HnswConfig,
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
    states: RwLock<HashMap<String, CollectionState>>,
}

impl CollectionManager {
    #[inline]
    pub fn new(store: Arc<dyn VectorStore>, dimension: usize, hnsw: HnswConfig) -> Self {
        Self {
            store,
            schema: CollectionSchema::chunks(dimension),
            hnsw,
            locks: Mutex::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Layout every managed collection is created with
    #[inline]
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    fn set_state(&self, name: &str, state: CollectionState) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), state);
    }

    fn cached_state(&self, name: &str) -> Option<CollectionState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// Per-collection lock serializing creation and index builds
    fn collection_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = locks.get(name).and_then(Weak::upgrade) {
            return lock;
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(name.to_string(), Arc::downgrade(&lock));
        lock
    }

    fn inconsistent(name: &str, reason: impl Into<String>) -> RagError {
        RagError::SchemaInconsistency {
            collection: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Make sure `name` exists with the chunk layout and its indexes.
    ///
    /// Existing collections are described and compared, never recreated; their
    /// missing indexes are left to [`Self::reconcile_indexes`]. A new collection whose
    /// indexes cannot be created is reported as inconsistent.
    #[instrument(skip(self))]
    pub async fn ensure_collection(&self, name: &str) -> Result<EnsureOutcome> {
        validate_collection_name(name)?;
        if self.store.has_collection(name).await? {
            return self.adopt_existing(name).await;
        }

        let lock = self.collection_lock(name);
        let _creating = lock.lock().await;
        if self.store.has_collection(name).await? {
            return self.adopt_existing(name).await;
        }

        match self.store.create_collection(name, &self.schema).await {
            Ok(()) => {}
            Err(StoreError::CollectionExists(_)) => {
                // Created by another process between the check and the create
                self.check_existing(name).await?;
                self.set_state(name, CollectionState::Created);
                return Ok(EnsureOutcome::Existing);
            }
            Err(e) => return Err(e.into()),
        }
        self.set_state(name, CollectionState::Created);

        let indexes = self.schema.indexes(self.hnsw);
        for index in &indexes {
            self.create_index(name, index).await?;
        }

        info!("Created collection {} with {} indexes", name, indexes.len());
        Ok(EnsureOutcome::Created)
    }

    async fn adopt_existing(&self, name: &str) -> Result<EnsureOutcome> {
        self.check_existing(name).await?;
        if self.cached_state(name).is_none() {
            self.set_state(name, CollectionState::Created);
        }
        Ok(EnsureOutcome::Existing)
    }

    async fn check_existing(&self, name: &str) -> Result<()> {
        let actual = self.store.describe_collection(name).await?;
        self.schema
            .check_compatible(&actual)
            .map_err(|reason| Self::inconsistent(name, reason))
    }

    async fn create_index(&self, name: &str, index: &IndexSpec) -> Result<IndexBuild> {
        self.store.create_index(name, index).await.map_err(|e| {
            warn!("Index {} on {} failed: {}", index.name, name, e);
            Self::inconsistent(
                name,
                format!("index '{}' could not be created: {}", index.name, e),
            )
        })
    }

    /// Build declared indexes the collection is still missing, returning the names
    /// built by this call.
    ///
    /// A failed build is logged and left for the next call; it never fails the caller.
    #[inline]
    pub async fn reconcile_indexes(&self, name: &str) -> Result<Vec<String>> {
        let lock = self.collection_lock(name);
        let _building = lock.lock().await;

        let existing = self.store.list_indexes(name).await?;
        let mut built = Vec::new();

        for index in self.schema.indexes(self.hnsw) {
            if existing.contains(&index.name) {
                continue;
            }
            match self.store.create_index(name, &index).await {
                Ok(IndexBuild::Built) => built.push(index.name),
                Ok(IndexBuild::Deferred) => {}
                Err(e) => warn!("Index {} on {} still pending: {}", index.name, name, e),
            }
        }

        if !built.is_empty() {
            debug!("Built pending indexes {:?} on {}", built, name);
        }
        Ok(built)
    }

    /// Bring a collection into the serving set. Loading an already loaded collection
    /// refreshes its handle.
    #[inline]
    pub async fn load(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        self.store.load_collection(name).await?;
        self.set_state(name, CollectionState::Loaded);
        debug!("Collection {} loaded", name);
        Ok(())
    }

    #[inline]
    pub async fn release(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        self.store.release_collection(name).await?;
        self.set_state(name, CollectionState::Released);
        debug!("Collection {} released", name);
        Ok(())
    }

    #[inline]
    pub async fn state(&self, name: &str) -> Result<CollectionState> {
        if !self.store.has_collection(name).await? {
            self.states
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(name);
            return Ok(CollectionState::Absent);
        }
        Ok(self.cached_state(name).unwrap_or(CollectionState::Created))
    }
}
