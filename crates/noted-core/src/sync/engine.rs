//! Offline-first sync engine.
//!
//! Mutators write through to the local store first and then either reach the
//! server immediately or leave a [`PendingOperation`] behind. A sync cycle
//! fetches the remote note list, drains the queue in FIFO order and merges the
//! remote list back with last-writer-wins on modification time.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, Mutex as AsyncMutex};

use super::locks::NoteLocks;
use crate::auth::Session;
use crate::error::{Error, Result};
use crate::gateway::{GatewayError, NoteGateway};
use crate::models::{
    LocalId, Note, NoteDraft, NoteSyncStatus, PendingAction, PendingOperation, StoredNote,
    SyncConflict, DEFAULT_NOTE_COLOR, LOCAL_PENDING_WINS,
};
use crate::network::NetworkMonitor;
use crate::state::SyncState;
use crate::store::LocalNoteStore;
use crate::util::{to_epoch_millis, unix_millis_now};

const EVENT_CAPACITY: usize = 32;

/// Why a sync request did not run a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySyncing,
    Offline,
    Unauthenticated,
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Queued operations delivered to the server
    pub pushed: usize,
    /// Queued operations dropped as no longer applicable
    pub discarded: usize,
    /// Queued operations left for a later cycle
    pub deferred: usize,
    /// Remote notes inserted locally
    pub inserted: usize,
    /// Local notes overwritten by newer remote copies
    pub refreshed: usize,
    /// Remote copies ignored in favour of pending local edits
    pub conflicts: usize,
    pub completed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// Result of replaying one queued operation.
enum Replay {
    Delivered,
    Discarded,
    Blocked,
    /// The server lost the note; its queue was replaced by a fresh create.
    Recreated,
}

pub struct SyncEngine {
    store: LocalNoteStore,
    gateway: Arc<dyn NoteGateway>,
    network: Arc<NetworkMonitor>,
    default_color: String,
    locks: NoteLocks,
    /// Server ids deleted from this device. A merge never re-imports them.
    tombstones: AsyncMutex<HashSet<String>>,
    syncing: AtomicBool,
    state: Mutex<SyncState>,
    events: broadcast::Sender<SyncState>,
}

/// Releases the in-progress gate on drop.
struct CycleGate<'a>(&'a AtomicBool);

impl Drop for CycleGate<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(
        store: LocalNoteStore,
        gateway: Arc<dyn NoteGateway>,
        network: Arc<NetworkMonitor>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            gateway,
            network,
            default_color: DEFAULT_NOTE_COLOR.to_string(),
            locks: NoteLocks::default(),
            tombstones: AsyncMutex::new(HashSet::new()),
            syncing: AtomicBool::new(false),
            state: Mutex::new(SyncState::Idle),
            events,
        }
    }

    #[must_use]
    pub fn with_default_color(mut self, color: impl Into<String>) -> Self {
        self.default_color = color.into();
        self
    }

    #[must_use]
    pub const fn store(&self) -> &LocalNoteStore {
        &self.store
    }

    #[must_use]
    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    /// Sync state events: `Syncing` when a cycle starts, then `Completed` or
    /// `Failed` once it has finished.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncState> {
        self.events.subscribe()
    }

    /// Most recently published sync state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
            .lock()
            .map_or(SyncState::Idle, |state| state.clone())
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub async fn get_all_notes(&self) -> Result<Vec<StoredNote>> {
        self.store.get_all().await
    }

    pub async fn get_note(&self, local_id: &LocalId) -> Result<Option<StoredNote>> {
        self.store.get_by_local_id(local_id).await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.store.pending_count().await
    }

    pub async fn list_pending(&self) -> Result<Vec<PendingOperation>> {
        self.store.list_pending().await
    }

    pub async fn last_sync_time(&self) -> Result<i64> {
        self.store.last_sync_time().await
    }

    // ---------------------------------------------------------------------
    // Optimistic mutations
    // ---------------------------------------------------------------------

    /// Create a note locally, then push it when online with a session.
    pub async fn create_note(
        &self,
        draft: &NoteDraft,
        session: Option<&Session>,
    ) -> Result<StoredNote> {
        draft.validate()?;
        let user_id = self.store.current_user_id().await?.unwrap_or_default();
        let mut note = StoredNote::new_local(draft, &self.default_color, user_id);
        let _guard = self.locks.acquire(&note.local_id).await;
        self.store.save(&note).await?;
        tracing::debug!(local_id = %note.local_id, "Created note locally");

        if let Some(session) = self.remote_session(session) {
            match self.gateway.create_note(session, &note.to_draft()).await {
                Ok(remote) => {
                    note.acknowledge(&remote);
                    self.store.save(&note).await?;
                    return Ok(note);
                }
                Err(error) => log_deferred(&note.local_id, PendingAction::Create, &error),
            }
        }

        self.store
            .enqueue(
                PendingOperation::new(note.local_id.clone(), PendingAction::Create)
                    .with_note_data(draft.clone()),
            )
            .await?;
        Ok(note)
    }

    pub async fn update_note(
        &self,
        local_id: &LocalId,
        draft: &NoteDraft,
        session: Option<&Session>,
    ) -> Result<StoredNote> {
        draft.validate()?;
        let _guard = self.locks.acquire(local_id).await;
        let mut note = self.store.require(local_id).await?;
        note.apply_edit(draft);
        self.store.save(&note).await?;

        if let Some((session, server_id)) = self.immediate_target(&note, session).await? {
            match self
                .gateway
                .update_note(session, &server_id, &note.to_draft())
                .await
            {
                Ok(remote) => {
                    note.acknowledge(&remote);
                    self.store.save(&note).await?;
                    return Ok(note);
                }
                Err(error) => log_deferred(local_id, PendingAction::Update, &error),
            }
        }

        self.store
            .enqueue(
                PendingOperation::new(local_id.clone(), PendingAction::Update)
                    .with_note_data(draft.clone()),
            )
            .await?;
        Ok(note)
    }

    /// Remove a note locally. A note the server never saw leaves nothing
    /// behind; otherwise the server delete is attempted or queued.
    pub async fn delete_note(&self, local_id: &LocalId, session: Option<&Session>) -> Result<()> {
        let _guard = self.locks.acquire(local_id).await;
        let note = self.store.require(local_id).await?;
        {
            // Held across the local delete so a running merge cannot slip the
            // remote copy back in between.
            let mut tombstones = self.tombstones.lock().await;
            if let Some(server_id) = note.server_id() {
                tombstones.insert(server_id.to_string());
            }
            self.store.delete_by_local_id(local_id).await?;
        }
        let dropped = self.store.dequeue(local_id).await?;
        if dropped > 0 {
            tracing::debug!(local_id = %local_id, dropped, "Dropped queued operations for deleted note");
        }

        let Some(server_id) = note.server_id().map(ToString::to_string) else {
            return Ok(());
        };

        if let Some(session) = self.remote_session(session) {
            match self.gateway.delete_note(session, &server_id).await {
                Ok(()) => return Ok(()),
                Err(error) if is_missing_on_server(&error) => return Ok(()),
                Err(error) => log_deferred(local_id, PendingAction::Delete, &error),
            }
        }

        self.store
            .enqueue(
                PendingOperation::new(local_id.clone(), PendingAction::Delete)
                    .with_server_id(Some(&server_id)),
            )
            .await
    }

    pub async fn archive_note(
        &self,
        local_id: &LocalId,
        session: Option<&Session>,
    ) -> Result<StoredNote> {
        self.set_archived(local_id, true, session).await
    }

    pub async fn unarchive_note(
        &self,
        local_id: &LocalId,
        session: Option<&Session>,
    ) -> Result<StoredNote> {
        self.set_archived(local_id, false, session).await
    }

    async fn set_archived(
        &self,
        local_id: &LocalId,
        archived: bool,
        session: Option<&Session>,
    ) -> Result<StoredNote> {
        let action = if archived {
            PendingAction::Archive
        } else {
            PendingAction::Unarchive
        };
        let _guard = self.locks.acquire(local_id).await;
        let mut note = self.store.require(local_id).await?;
        note.apply_archived(archived);
        self.store.save(&note).await?;

        if let Some((session, server_id)) = self.immediate_target(&note, session).await? {
            let result = if archived {
                self.gateway.archive_note(session, &server_id).await
            } else {
                self.gateway.unarchive_note(session, &server_id).await
            };
            match result {
                Ok(remote) => {
                    note.acknowledge(&remote);
                    self.store.save(&note).await?;
                    return Ok(note);
                }
                Err(error) => log_deferred(local_id, action, &error),
            }
        }

        self.store
            .enqueue(PendingOperation::new(local_id.clone(), action))
            .await?;
        Ok(note)
    }

    /// Session usable for a remote call right now.
    fn remote_session<'a>(&self, session: Option<&'a Session>) -> Option<&'a Session> {
        session.filter(|_| self.network.is_online())
    }

    /// Session and server id for an immediate remote call, or `None` when
    /// the mutation has to be queued. Notes with queued operations keep
    /// queuing so per-note order holds.
    async fn immediate_target<'a>(
        &self,
        note: &StoredNote,
        session: Option<&'a Session>,
    ) -> Result<Option<(&'a Session, String)>> {
        let Some(session) = self.remote_session(session) else {
            return Ok(None);
        };
        let Some(server_id) = note.server_id() else {
            return Ok(None);
        };
        if self.store.pending_count_for(&note.local_id).await? > 0 {
            return Ok(None);
        }
        Ok(Some((session, server_id.to_string())))
    }

    // ---------------------------------------------------------------------
    // Sync cycle
    // ---------------------------------------------------------------------

    /// Run one fetch/drain/merge cycle.
    ///
    /// Skips (without error) when offline, unauthenticated, or while another
    /// cycle is running. Cycle failures are published as `Failed` and
    /// returned.
    pub async fn sync_notes(&self, session: Option<&Session>) -> Result<SyncOutcome> {
        if !self.network.is_online() {
            tracing::debug!("Sync skipped: offline");
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        let Some(session) = session else {
            tracing::debug!("Sync skipped: missing authentication");
            return Ok(SyncOutcome::Skipped(SkipReason::Unauthenticated));
        };
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync skipped: cycle already running");
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadySyncing));
        }

        let result = {
            let _gate = CycleGate(&self.syncing);
            self.publish(SyncState::Syncing);
            self.run_cycle(session).await
        };

        match result {
            Ok(report) => {
                tracing::info!(
                    pushed = report.pushed,
                    deferred = report.deferred,
                    inserted = report.inserted,
                    refreshed = report.refreshed,
                    conflicts = report.conflicts,
                    "Sync cycle completed"
                );
                self.publish(SyncState::Completed {
                    at: report.completed_at,
                });
                Ok(SyncOutcome::Completed(report))
            }
            Err(error) => {
                tracing::error!("Sync cycle failed: {}", error);
                self.publish(SyncState::Failed {
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    async fn run_cycle(&self, session: &Session) -> Result<SyncReport> {
        let settled_tombstones = self.tombstones.lock().await.clone();
        let remote_notes = self.gateway.list_notes(session).await?;
        let mut report = SyncReport::default();
        let deleted = self.drain(session, &mut report).await?;
        self.merge(&remote_notes, &deleted, &mut report).await?;

        // Tombstones recorded before the fetch whose notes the server no
        // longer lists are done.
        self.tombstones.lock().await.retain(|server_id| {
            !settled_tombstones.contains(server_id)
                || remote_notes.iter().any(|note| note.id == *server_id)
        });

        if let Some(user_id) = remote_notes
            .iter()
            .map(|note| note.user_id.trim())
            .find(|user_id| !user_id.is_empty())
        {
            self.store.set_current_user_id(user_id).await?;
        }

        report.completed_at = unix_millis_now();
        self.store.set_last_sync_time(report.completed_at).await?;
        Ok(report)
    }

    /// Replay the queue in FIFO order. Returns server ids deleted this pass.
    async fn drain(&self, session: &Session, report: &mut SyncReport) -> Result<HashSet<String>> {
        let operations = self.store.list_pending().await?;
        let mut blocked: HashSet<LocalId> = HashSet::new();
        let mut recreated: HashSet<LocalId> = HashSet::new();
        let mut deleted = HashSet::new();

        for op in operations {
            // Already replaced in the store by the re-create.
            if recreated.contains(&op.id) {
                continue;
            }
            if blocked.contains(&op.id) {
                report.deferred += 1;
                continue;
            }

            let _guard = self.locks.acquire(&op.id).await;
            match self.replay(session, &op, &mut deleted).await? {
                Replay::Delivered => {
                    self.store.remove_operation(&op).await?;
                    report.pushed += 1;
                }
                Replay::Discarded => {
                    self.store.remove_operation(&op).await?;
                    report.discarded += 1;
                }
                Replay::Blocked => {
                    blocked.insert(op.id.clone());
                    report.deferred += 1;
                }
                Replay::Recreated => {
                    recreated.insert(op.id.clone());
                    report.deferred += 1;
                }
            }
        }

        Ok(deleted)
    }

    /// Replay one operation. Caller holds the note lock.
    async fn replay(
        &self,
        session: &Session,
        op: &PendingOperation,
        deleted: &mut HashSet<String>,
    ) -> Result<Replay> {
        if op.action == PendingAction::Delete {
            let Some(server_id) = op.server_id.clone() else {
                return Ok(Replay::Discarded);
            };
            return match self.gateway.delete_note(session, &server_id).await {
                Ok(()) => {
                    deleted.insert(server_id);
                    Ok(Replay::Delivered)
                }
                Err(error) if is_missing_on_server(&error) => {
                    deleted.insert(server_id);
                    Ok(Replay::Discarded)
                }
                Err(error) => {
                    log_replay_failure(op, &error);
                    Ok(Replay::Blocked)
                }
            };
        }

        let Some(mut note) = self.store.get_by_local_id(&op.id).await? else {
            tracing::debug!(local_id = %op.id, action = %op.action, "Dropping operation for missing note");
            return Ok(Replay::Discarded);
        };

        let result = match (op.action, note.server_id()) {
            // Already created, possibly by an immediate or forced sync.
            (PendingAction::Create, Some(_)) => return Ok(Replay::Discarded),
            (PendingAction::Create, None) => {
                self.gateway.create_note(session, &note.to_draft()).await
            }
            // Waits for the note's create to land.
            (_, None) => return Ok(Replay::Blocked),
            (PendingAction::Update, Some(server_id)) => {
                self.gateway
                    .update_note(session, server_id, &note.to_draft())
                    .await
            }
            (PendingAction::Archive, Some(server_id)) => {
                self.gateway.archive_note(session, server_id).await
            }
            (PendingAction::Unarchive, Some(server_id)) => {
                self.gateway.unarchive_note(session, server_id).await
            }
            (PendingAction::Delete, Some(_)) => return Ok(Replay::Discarded),
        };

        match result {
            Ok(remote) => {
                let remaining = self.store.pending_count_for(&op.id).await?;
                // `op` itself is still queued at this point.
                if remaining > 1 {
                    note.adopt_server_identity(&remote);
                } else {
                    note.acknowledge(&remote);
                }
                self.store.save(&note).await?;
                Ok(Replay::Delivered)
            }
            Err(error) if op.action != PendingAction::Create && is_missing_on_server(&error) => {
                self.requeue_as_create(&mut note, deleted).await?;
                Ok(Replay::Recreated)
            }
            Err(error) => {
                log_replay_failure(op, &error);
                Ok(Replay::Blocked)
            }
        }
    }

    /// The server no longer has this note. Keep the local edits: drop the
    /// stale server id and queue a create (plus an archive when needed) in
    /// place of the note's queued operations.
    async fn requeue_as_create(
        &self,
        note: &mut StoredNote,
        deleted: &mut HashSet<String>,
    ) -> Result<()> {
        if let Some(server_id) = note.server_id() {
            tracing::warn!(
                local_id = %note.local_id,
                server_id = %server_id,
                "Note is gone from the server, re-creating it from the local copy"
            );
            deleted.insert(server_id.to_string());
        }
        note.detach_from_server();
        self.store.save(note).await?;
        self.store.dequeue(&note.local_id).await?;
        self.store
            .enqueue(
                PendingOperation::new(note.local_id.clone(), PendingAction::Create)
                    .with_note_data(note.to_draft()),
            )
            .await?;
        if note.archived {
            self.store
                .enqueue(PendingOperation::new(
                    note.local_id.clone(),
                    PendingAction::Archive,
                ))
                .await?;
        }
        Ok(())
    }

    /// Fold the remote list into local state.
    async fn merge(
        &self,
        remote_notes: &[Note],
        deleted: &HashSet<String>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let queued_deletes: HashSet<String> = self
            .store
            .list_pending()
            .await?
            .into_iter()
            .filter(|op| op.action == PendingAction::Delete)
            .filter_map(|op| op.server_id)
            .collect();

        for remote in remote_notes {
            if deleted.contains(&remote.id) || queued_deletes.contains(&remote.id) {
                continue;
            }

            let Some(existing) = self.find_or_import(remote, report).await? else {
                continue;
            };

            let _guard = self.locks.acquire(&existing.local_id).await;
            // Re-read under the lock; a mutation may have landed meanwhile.
            let Some(mut local) = self.store.get_by_local_id(&existing.local_id).await? else {
                continue;
            };
            let remote_modified = to_epoch_millis(&remote.updated_at);
            if remote_modified <= local.last_modified {
                continue;
            }

            if local.is_synced() {
                local.overwrite_from_remote(remote);
                self.store.save(&local).await?;
                report.refreshed += 1;
            } else {
                tracing::debug!(
                    local_id = %local.local_id,
                    server_id = %remote.id,
                    "Keeping pending local edit over newer remote copy"
                );
                self.store
                    .record_conflict(SyncConflict {
                        local_id: local.local_id.clone(),
                        note_id: remote.id.clone(),
                        local_updated_at: local.last_modified,
                        incoming_updated_at: remote_modified,
                        resolved_at: unix_millis_now(),
                        strategy: LOCAL_PENDING_WINS.to_string(),
                    })
                    .await?;
                report.conflicts += 1;
            }
        }

        Ok(())
    }

    /// Local copy of `remote`, or `None` after importing it (or skipping a
    /// tombstoned id). The tombstone lock covers the check and the insert.
    async fn find_or_import(
        &self,
        remote: &Note,
        report: &mut SyncReport,
    ) -> Result<Option<StoredNote>> {
        let tombstones = self.tombstones.lock().await;
        if tombstones.contains(&remote.id) {
            return Ok(None);
        }
        if let Some(existing) = self.store.get_by_server_id(&remote.id).await? {
            return Ok(Some(existing));
        }
        self.store.save(&StoredNote::from_remote(remote)).await?;
        report.inserted += 1;
        Ok(None)
    }

    fn publish(&self, state: SyncState) {
        if let Ok(mut current) = self.state.lock() {
            current.clone_from(&state);
        }
        // No receivers is fine.
        let _ = self.events.send(state);
    }

    // ---------------------------------------------------------------------
    // Force sync
    // ---------------------------------------------------------------------

    /// Push one note's current state right now, bypassing the queue.
    ///
    /// Creates the note on the server when it has no server id, updates it
    /// otherwise. Errors are returned to the caller.
    pub async fn force_sync_note(
        &self,
        local_id: &LocalId,
        session: Option<&Session>,
    ) -> Result<StoredNote> {
        if !self.network.is_online() {
            return Err(Error::Offline);
        }
        let session = session.ok_or(Error::Unauthenticated)?;

        let _guard = self.locks.acquire(local_id).await;
        let mut note = self.store.require(local_id).await?;
        let draft = note.to_draft();
        let remote = match note.server_id() {
            None => self.gateway.create_note(session, &draft).await?,
            Some(server_id) => self.gateway.update_note(session, server_id, &draft).await?,
        };

        // Queued creates and updates are now redundant; keep archive flips.
        let mut remaining = 0;
        for op in self.store.list_pending().await? {
            if op.id != *local_id {
                continue;
            }
            if matches!(op.action, PendingAction::Create | PendingAction::Update) {
                self.store.remove_operation(&op).await?;
            } else {
                remaining += 1;
            }
        }

        if remaining == 0 {
            note.acknowledge(&remote);
        } else {
            note.adopt_server_identity(&remote);
            note.sync_status = NoteSyncStatus::Pending;
        }
        self.store.save(&note).await?;
        tracing::info!(local_id = %local_id, server_id = %remote.id, "Force-synced note");
        Ok(note)
    }
}

fn log_deferred(local_id: &LocalId, action: PendingAction, error: &GatewayError) {
    tracing::warn!(
        local_id = %local_id,
        action = %action,
        "Immediate sync failed, queued for retry: {}",
        error
    );
}

fn log_replay_failure(op: &PendingOperation, error: &GatewayError) {
    tracing::warn!(
        local_id = %op.id,
        action = %op.action,
        "Queued operation failed, keeping it for the next cycle: {}",
        error
    );
}

fn is_missing_on_server(error: &GatewayError) -> bool {
    matches!(error, GatewayError::Api { status: 404, .. })
}
