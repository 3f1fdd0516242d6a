
use std::sync::atomic::{AtomicI64, Ordering};

/// Low bits reserved for ids handed out within the same millisecond
const SEQUENCE_BITS: u32 = 18;

/// Primary key allocator for auto-id fields.
///
/// Ids are the wall clock in milliseconds shifted left by `SEQUENCE_BITS`, bumped past
/// the last id handed out, so they stay increasing across restarts and are never
/// reused after deletes.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: AtomicI64,
}

impl IdAllocator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure future ids are greater than `id`
    #[inline]
    pub fn observe(&self, id: i64) {
        self.last.fetch_max(id, Ordering::SeqCst);
    }

    #[inline]
    pub fn next_id(&self) -> i64 {
        self.reserve(1)
    }

    /// Reserve `count` consecutive ids and return the first one
    #[inline]
    pub fn reserve(&self, count: usize) -> i64 {
        let count = i64::try_from(count.max(1)).unwrap_or(i64::MAX);
        let clock = chrono::Utc::now().timestamp_millis() << SEQUENCE_BITS;

        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let first = clock.max(last.saturating_add(1));
            let end = first.saturating_add(count - 1);
            match self
                .last
                .compare_exchange(last, end, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return first,
                Err(current) => last = current,
            }
        }
    }
}
