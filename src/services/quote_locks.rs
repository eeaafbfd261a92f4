use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// Per-quote async mutexes serializing mutations of the same quote.
///
/// An entry lives only while some task holds or awaits its lock.
#[derive(Clone, Default)]
pub struct QuoteLockRegistry {
    locks: Arc<LockMap>,
}

/// Exclusive access to one quote. Dropping it unlocks the quote and removes
/// the registry entry when no other task is waiting for it.
pub struct QuoteLockGuard {
    quote_id: Uuid,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for QuoteLockGuard {
    fn drop(&mut self) {
        // Unlock first so the strong count below reflects waiters only.
        self.guard.take();
        self.locks
            .remove_if(&self.quote_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl QuoteLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `quote_id`.
    pub async fn lock(&self, quote_id: Uuid) -> QuoteLockGuard {
        let mutex = self
            .locks
            .entry(quote_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        QuoteLockGuard {
            quote_id,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
