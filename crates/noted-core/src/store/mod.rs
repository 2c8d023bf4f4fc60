//! Local note store: notes and the pending-operation queue as
//! whole-collection JSON records over a [`KeyValueStore`].
//!
//! Every call loads the full collection, mutates it and writes it back while
//! holding a store-wide lock, so a single call is atomic with respect to
//! other calls on the same store.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::{LocalId, PendingOperation, StoredNote, SyncConflict};

/// Storage keys for the persisted records.
pub mod keys {
    pub const NOTES: &str = "notes_offline";
    pub const PENDING_SYNC: &str = "pending_sync";
    pub const LAST_SYNC: &str = "last_sync";
    pub const USER_ID: &str = "user_id";
    pub const SYNC_CONFLICTS: &str = "sync_conflicts";
}

/// Upper bound on retained conflict records.
const MAX_CONFLICT_RECORDS: usize = 100;

#[derive(Clone)]
pub struct LocalNoteStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl LocalNoteStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.kv.get(key).await? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn save_list<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let raw = serde_json::to_string(items)?;
        self.kv.set(key, &raw).await
    }

    // ---------------------------------------------------------------------
    // Notes
    // ---------------------------------------------------------------------

    /// All stored notes in insertion order.
    pub async fn get_all(&self) -> Result<Vec<StoredNote>> {
        let _guard = self.write_lock.lock().await;
        self.load_list(keys::NOTES).await
    }

    /// Insert or replace a note by local id.
    pub async fn save(&self, note: &StoredNote) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut notes: Vec<StoredNote> = self.load_list(keys::NOTES).await?;
        if let Some(existing) = notes.iter_mut().find(|n| n.local_id == note.local_id) {
            *existing = note.clone();
        } else {
            notes.push(note.clone());
        }
        self.save_list(keys::NOTES, &notes).await
    }

    /// Remove a note by local id. Returns whether a note was removed.
    pub async fn delete_by_local_id(&self, local_id: &LocalId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut notes: Vec<StoredNote> = self.load_list(keys::NOTES).await?;
        let before = notes.len();
        notes.retain(|n| &n.local_id != local_id);
        let removed = notes.len() != before;
        if removed {
            self.save_list(keys::NOTES, &notes).await?;
        }
        Ok(removed)
    }

    pub async fn get_by_local_id(&self, local_id: &LocalId) -> Result<Option<StoredNote>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .find(|n| &n.local_id == local_id))
    }

    /// Like [`Self::get_by_local_id`] but a missing note is an error.
    pub async fn require(&self, local_id: &LocalId) -> Result<StoredNote> {
        self.get_by_local_id(local_id)
            .await?
            .ok_or_else(|| Error::NotFound(local_id.to_string()))
    }

    pub async fn get_by_server_id(&self, server_id: &str) -> Result<Option<StoredNote>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .find(|n| n.server_id() == Some(server_id)))
    }

    // ---------------------------------------------------------------------
    // Pending operations
    // ---------------------------------------------------------------------

    /// Append an operation to the end of the queue.
    pub async fn enqueue(&self, op: PendingOperation) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut ops: Vec<PendingOperation> = self.load_list(keys::PENDING_SYNC).await?;
        ops.push(op);
        self.save_list(keys::PENDING_SYNC, &ops).await
    }

    /// Remove every queued operation targeting `local_id`.
    pub async fn dequeue(&self, local_id: &LocalId) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut ops: Vec<PendingOperation> = self.load_list(keys::PENDING_SYNC).await?;
        let before = ops.len();
        ops.retain(|op| &op.id != local_id);
        let removed = before - ops.len();
        if removed > 0 {
            self.save_list(keys::PENDING_SYNC, &ops).await?;
        }
        Ok(removed)
    }

    /// Remove the first queued entry equal to `op`, leaving later
    /// operations for the same note in place.
    pub async fn remove_operation(&self, op: &PendingOperation) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut ops: Vec<PendingOperation> = self.load_list(keys::PENDING_SYNC).await?;
        let Some(index) = ops.iter().position(|queued| queued == op) else {
            return Ok(false);
        };
        ops.remove(index);
        self.save_list(keys::PENDING_SYNC, &ops).await?;
        Ok(true)
    }

    /// Queued operations in FIFO order.
    pub async fn list_pending(&self) -> Result<Vec<PendingOperation>> {
        let _guard = self.write_lock.lock().await;
        self.load_list(keys::PENDING_SYNC).await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.list_pending().await?.len())
    }

    /// Number of queued operations targeting `local_id`.
    pub async fn pending_count_for(&self, local_id: &LocalId) -> Result<usize> {
        Ok(self
            .list_pending()
            .await?
            .iter()
            .filter(|op| &op.id == local_id)
            .count())
    }

    pub async fn clear_pending(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(keys::PENDING_SYNC).await
    }

    // ---------------------------------------------------------------------
    // Sync bookkeeping
    // ---------------------------------------------------------------------

    /// Unix ms of the last completed sync cycle, or 0 when never synced.
    pub async fn last_sync_time(&self) -> Result<i64> {
        Ok(self
            .kv
            .get(keys::LAST_SYNC)
            .await?
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0))
    }

    pub async fn set_last_sync_time(&self, timestamp_ms: i64) -> Result<()> {
        self.kv
            .set(keys::LAST_SYNC, &timestamp_ms.to_string())
            .await
    }

    pub async fn current_user_id(&self) -> Result<Option<String>> {
        self.kv.get(keys::USER_ID).await
    }

    pub async fn set_current_user_id(&self, user_id: &str) -> Result<()> {
        self.kv.set(keys::USER_ID, user_id).await
    }

    /// Append a conflict record, keeping only the newest ones.
    pub async fn record_conflict(&self, conflict: SyncConflict) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut conflicts: Vec<SyncConflict> = self.load_list(keys::SYNC_CONFLICTS).await?;
        conflicts.push(conflict);
        if conflicts.len() > MAX_CONFLICT_RECORDS {
            let excess = conflicts.len() - MAX_CONFLICT_RECORDS;
            conflicts.drain(..excess);
        }
        self.save_list(keys::SYNC_CONFLICTS, &conflicts).await
    }

    /// Most recent conflicts first.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let _guard = self.write_lock.lock().await;
        let conflicts: Vec<SyncConflict> = self.load_list(keys::SYNC_CONFLICTS).await?;
        Ok(conflicts.into_iter().rev().take(limit).collect())
    }

    /// Remove every record this store owns.
    pub async fn clear_all_data(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv
            .remove_many(&[
                keys::NOTES,
                keys::PENDING_SYNC,
                keys::LAST_SYNC,
                keys::USER_ID,
                keys::SYNC_CONFLICTS,
            ])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LibSqlKeyValueStore, MemoryKeyValueStore};
    use crate::models::{NoteDraft, NoteSyncStatus, PendingAction, LOCAL_PENDING_WINS};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn memory_store() -> LocalNoteStore {
        LocalNoteStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    fn note(title: &str) -> StoredNote {
        StoredNote::new_local(&NoteDraft::new(title, "body"), "#ffffff", "me")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_upserts_by_local_id() {
        let store = memory_store();
        let mut first = note("first");
        store.save(&first).await.unwrap();
        store.save(&note("second")).await.unwrap();

        first.title = "renamed".to_string();
        store.save(&first).await.unwrap();

        let notes = store.get_all().await.unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].title, "renamed");
        assert_eq!(
            store.get_by_local_id(&first.local_id).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_removes_only_target_note() {
        let store = memory_store();
        let keep = note("keep");
        let drop = note("drop");
        store.save(&keep).await.unwrap();
        store.save(&drop).await.unwrap();

        assert!(store.delete_by_local_id(&drop.local_id).await.unwrap());
        assert!(!store.delete_by_local_id(&drop.local_id).await.unwrap());

        let notes = store.get_all().await.unwrap();
        assert_eq!(notes, vec![keep]);
        assert!(matches!(
            store.require(&drop.local_id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_id_lookup_ignores_local_only_notes() {
        let store = memory_store();
        let mut synced = note("synced");
        synced.id = Some("9".to_string());
        synced.sync_status = NoteSyncStatus::Synced;
        store.save(&note("local")).await.unwrap();
        store.save(&synced).await.unwrap();

        let found = store.get_by_server_id("9").await.unwrap().unwrap();
        assert_eq!(found.local_id, synced.local_id);
        assert!(store.get_by_server_id("10").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_is_fifo_and_dequeue_removes_all_for_note() {
        let store = memory_store();
        let a = LocalId::from("local_a");
        let b = LocalId::from("local_b");
        store
            .enqueue(PendingOperation::new(a.clone(), PendingAction::Create))
            .await
            .unwrap();
        store
            .enqueue(PendingOperation::new(b.clone(), PendingAction::Create))
            .await
            .unwrap();
        store
            .enqueue(PendingOperation::new(a.clone(), PendingAction::Update))
            .await
            .unwrap();

        let actions = store
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|op| (op.id, op.action))
            .collect::<Vec<_>>();
        assert_eq!(
            actions,
            vec![
                (a.clone(), PendingAction::Create),
                (b.clone(), PendingAction::Create),
                (a.clone(), PendingAction::Update),
            ]
        );
        assert_eq!(store.pending_count_for(&a).await.unwrap(), 2);

        assert_eq!(store.dequeue(&a).await.unwrap(), 2);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_operation_keeps_later_ops_for_same_note() {
        let store = memory_store();
        let id = LocalId::from("local_a");
        let create = PendingOperation::new(id.clone(), PendingAction::Create);
        let update = PendingOperation {
            timestamp: create.timestamp + 1,
            ..PendingOperation::new(id.clone(), PendingAction::Update)
        };
        store.enqueue(create.clone()).await.unwrap();
        store.enqueue(update.clone()).await.unwrap();

        assert!(store.remove_operation(&create).await.unwrap());
        assert!(!store.remove_operation(&create).await.unwrap());
        assert_eq!(store.list_pending().await.unwrap(), vec![update]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bookkeeping_defaults_and_clear_all() {
        let store = LocalNoteStore::new(Arc::new(
            LibSqlKeyValueStore::open_in_memory().await.unwrap(),
        ));
        assert_eq!(store.last_sync_time().await.unwrap(), 0);
        assert_eq!(store.current_user_id().await.unwrap(), None);

        store.set_last_sync_time(1234).await.unwrap();
        store.set_current_user_id("user-1").await.unwrap();
        store.save(&note("x")).await.unwrap();
        store
            .enqueue(PendingOperation::new(LocalId::from("x"), PendingAction::Delete))
            .await
            .unwrap();
        assert_eq!(store.last_sync_time().await.unwrap(), 1234);
        assert_eq!(
            store.current_user_id().await.unwrap().as_deref(),
            Some("user-1")
        );

        store.clear_all_data().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
        assert_eq!(store.pending_count().await.unwrap(), 0);
        assert_eq!(store.last_sync_time().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflicts_are_capped_and_listed_newest_first() {
        let store = memory_store();
        for index in 0..105 {
            store
                .record_conflict(SyncConflict {
                    local_id: LocalId::from("local_a"),
                    note_id: index.to_string(),
                    local_updated_at: 2,
                    incoming_updated_at: 3,
                    resolved_at: index,
                    strategy: LOCAL_PENDING_WINS.to_string(),
                })
                .await
                .unwrap();
        }

        let recent = store.list_conflicts(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].note_id, "104");
        assert_eq!(store.list_conflicts(500).await.unwrap().len(), 100);
    }

    struct FailingKv;

    #[async_trait]
    impl KeyValueStore for FailingKv {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Database("disk unavailable".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Database("disk unavailable".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::Database("disk unavailable".to_string()))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn backend_failures_are_surfaced() {
        let store = LocalNoteStore::new(Arc::new(FailingKv));
        assert!(store.get_all().await.is_err());
        assert!(store.save(&note("x")).await.is_err());
        assert!(store.pending_count().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupt_records_are_reported_not_dropped() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(keys::NOTES, "{not json").await.unwrap();
        let store = LocalNoteStore::new(kv);

        assert!(matches!(
            store.get_all().await,
            Err(Error::Serialization(_))
        ));
    }
}
