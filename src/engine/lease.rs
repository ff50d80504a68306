//! Per-thread mutual-exclusion leases.
//!
//! A given thread id is processed by at most one turn at a time; concurrent
//! turns for the same thread would race checkpoint writes and corrupt message
//! ordering. Distinct thread ids never contend with each other.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// Registry of per-thread locks. Entries are created on first use; idle
/// entries are swept on the next acquisition, so the map tracks threads with
/// an active or waiting turn rather than every id ever seen. The map itself
/// is only locked briefly to look up or insert an entry.
#[derive(Default)]
pub struct ThreadLeases {
    locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one turn; releasing it ends the lease.
pub type Lease = OwnedMutexGuard<()>;

impl ThreadLeases {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lease for `thread_id`, waiting up to `timeout`.
    ///
    /// Returns `None` when another turn still holds the lease at expiry; the
    /// caller should surface this as a retryable busy condition.
    pub async fn acquire(&self, thread_id: &str, timeout: Duration) -> Option<Lease> {
        let lock = {
            let mut locks = self.locks.lock();
            // Holders and waiters each keep an Arc clone alive, so an entry
            // whose only reference is the map itself is idle and safe to drop.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        tokio::time::timeout(timeout, lock.lock_owned()).await.ok()
    }

    /// Number of thread ids currently tracked. Test-oriented helper to
    /// assert on eviction.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_thread_serializes() {
        let leases = ThreadLeases::new();
        let held = leases
            .acquire("t1", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(
            leases.acquire("t1", Duration::from_millis(50)).await.is_none(),
            "second acquisition must time out while the lease is held"
        );
        drop(held);
        assert!(
            leases
                .acquire("t1", Duration::from_millis(50))
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn idle_entries_are_evicted_on_next_acquire() {
        let leases = ThreadLeases::new();
        for id in ["a", "b", "c"] {
            let lease = leases.acquire(id, Duration::from_millis(50)).await.unwrap();
            drop(lease);
        }

        // All three are idle now; the next acquisition sweeps them.
        let held = leases
            .acquire("d", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(leases.tracked(), 1);
        drop(held);
    }

    #[tokio::test]
    async fn held_entries_survive_the_sweep() {
        let leases = ThreadLeases::new();
        let held = leases
            .acquire("t1", Duration::from_millis(50))
            .await
            .unwrap();
        let _other = leases
            .acquire("t2", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(leases.tracked(), 2);
        drop(held);
    }

    #[tokio::test]
    async fn distinct_threads_do_not_contend() {
        let leases = ThreadLeases::new();
        let _a = leases
            .acquire("t1", Duration::from_millis(50))
            .await
            .unwrap();
        let _b = leases
            .acquire("t2", Duration::from_millis(50))
            .await
            .unwrap();
    }
}
