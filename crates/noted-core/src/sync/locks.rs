//! Keyed async mutex serializing load-modify-save sequences per note.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::LocalId;

#[derive(Default)]
pub(crate) struct NoteLocks {
    locks: Mutex<HashMap<LocalId, Arc<AsyncMutex<()>>>>,
}

impl NoteLocks {
    /// Wait for exclusive access to `local_id`. Released on drop.
    pub(crate) async fn acquire(&self, local_id: &LocalId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            // Entries nobody holds or waits on only keep the map growing.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(local_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn same_key_is_serialized() {
        let locks = Arc::new(NoteLocks::default());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let id = LocalId::from("local_a");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn different_keys_do_not_block_each_other() {
        let locks = NoteLocks::default();
        let _a = locks.acquire(&LocalId::from("local_a")).await;
        let b = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire(&LocalId::from("local_b")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn released_entries_are_pruned() {
        let locks = NoteLocks::default();
        for index in 0..10 {
            let _guard = locks.acquire(&LocalId::from(format!("local_{index}"))).await;
        }
        let _last = locks.acquire(&LocalId::from("local_last")).await;
        assert_eq!(locks.tracked(), 1);
    }
}
