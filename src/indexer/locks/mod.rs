
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

type FileKey = (String, i64);

/// Serializes writers per `(collection, file_id)`.
///
/// Entries are weak so the table only holds keys somebody is waiting on or holding.
#[derive(Debug, Default)]
pub struct FileLocks {
    entries: Mutex<HashMap<FileKey, Weak<tokio::sync::Mutex<()>>>>,
}

/// Held file locks; released on drop
#[derive(Debug)]
pub struct FileLockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl FileLocks {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, collection: &str, file_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        // The table stays consistent even if a holder panicked
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, lock| lock.strong_count() > 0);

        let key = (collection.to_string(), file_id);
        if let Some(lock) = entries.get(&key).and_then(Weak::upgrade) {
            return lock;
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        entries.insert(key, Arc::downgrade(&lock));
        lock
    }

    #[inline]
    pub async fn lock(&self, collection: &str, file_id: i64) -> FileLockGuard {
        self.lock_many(collection, [file_id]).await
    }

    /// Lock several files of one collection. Ids are taken in ascending order so two
    /// callers with overlapping sets cannot deadlock.
    #[inline]
    pub async fn lock_many(
        &self,
        collection: &str,
        file_ids: impl IntoIterator<Item = i64>,
    ) -> FileLockGuard {
        let mut ids: Vec<i64> = file_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for file_id in ids {
            trace!("Waiting for lock on {}/{}", collection, file_id);
            guards.push(self.entry(collection, file_id).lock_owned().await);
        }

        FileLockGuard { _guards: guards }
    }

    /// Number of keys currently held or awaited
    #[inline]
    pub fn active(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}
