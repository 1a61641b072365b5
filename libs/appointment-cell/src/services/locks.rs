// libs/appointment-cell/src/services/locks.rs
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Serializes check-then-write per `(professional, date)`. Bookings for
/// different keys never wait on each other.
#[derive(Default)]
pub struct SlotLockRegistry {
    locks: Mutex<HashMap<(Uuid, NaiveDate), Arc<Mutex<()>>>>,
}

impl SlotLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, professional_id: Uuid, date: NaiveDate) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on are only referenced by the map
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry((professional_id, date)).or_default())
        };

        debug!("Acquiring scheduling lock for professional {} on {}", professional_id, date);
        lock.lock_owned().await
    }

    /// Locks several keys at once, always in key order, so two callers
    /// asking for overlapping keys cannot deadlock. Duplicates are locked once.
    pub async fn acquire_all(&self, keys: &[(Uuid, NaiveDate)]) -> Vec<OwnedMutexGuard<()>> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for (professional_id, date) in keys {
            guards.push(self.acquire(professional_id, date).await);
        }
        guards
    }

    pub async fn tracked_keys(&self) -> usize {
        self.locks.lock().await.len()
    }
}
