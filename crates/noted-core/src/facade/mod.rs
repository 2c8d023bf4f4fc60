//! Observable notes state for frontends.
//!
//! [`NotesFacade`] wraps the sync engine with the ambient session, keeps a
//! [`NotesSnapshot`] current, and runs automatic syncs when connectivity
//! returns or a session becomes available.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::auth::Session;
use crate::error::Result;
use crate::models::{LocalId, NoteDraft, StoredNote};
use crate::state::SyncState;
use crate::sync::{SyncEngine, SyncOutcome};

/// Everything a notes screen renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesSnapshot {
    pub notes: Vec<StoredNote>,
    pub is_loading: bool,
    pub is_online: bool,
    pub sync_state: SyncState,
    pub pending_sync_count: usize,
    /// Unix ms of the last completed cycle
    pub last_sync_at: Option<i64>,
}

struct Inner {
    engine: Arc<SyncEngine>,
    session: watch::Sender<Option<Session>>,
    snapshot: watch::Sender<NotesSnapshot>,
}

pub struct NotesFacade {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotesFacade {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let (session, _) = watch::channel(None);
        let initial = NotesSnapshot {
            is_online: engine.network().is_online(),
            sync_state: engine.state(),
            ..NotesSnapshot::default()
        };
        let (snapshot, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                engine,
                session,
                snapshot,
            }),
            task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.inner.engine
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NotesSnapshot> {
        self.inner.snapshot.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> NotesSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.current_session()
    }

    /// Replace the ambient session. A new session while online triggers a
    /// sync once the facade is started.
    pub fn set_session(&self, session: Option<Session>) {
        self.inner.session.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
    }

    /// Load the snapshot, start the network monitor and the auto-sync task.
    pub async fn start(&self) -> Result<()> {
        self.inner.reload_with_loading().await?;
        self.inner.engine.network().start().await;
        self.inner.set_online(self.inner.engine.network().is_online());

        let Ok(mut task) = self.task.lock() else {
            tracing::warn!("Facade task lock poisoned; auto-sync not started");
            return Ok(());
        };
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run().await }));
        Ok(())
    }

    /// Stop the auto-sync task and the network monitor.
    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        self.inner.engine.network().stop();
    }

    /// Re-read local state, then sync when possible. Sync errors are
    /// returned.
    pub async fn refresh(&self) -> Result<SyncOutcome> {
        self.inner.reload_with_loading().await?;
        let outcome = self.sync_notes().await;
        self.inner.reload().await?;
        outcome
    }

    pub async fn sync_notes(&self) -> Result<SyncOutcome> {
        let session = self.inner.current_session();
        let outcome = self.inner.engine.sync_notes(session.as_ref()).await;
        self.inner.reload().await?;
        outcome
    }

    pub async fn create_note(&self, draft: &NoteDraft) -> Result<StoredNote> {
        let session = self.inner.current_session();
        let note = self
            .inner
            .engine
            .create_note(draft, session.as_ref())
            .await?;
        self.inner.reload().await?;
        Ok(note)
    }

    pub async fn update_note(&self, local_id: &LocalId, draft: &NoteDraft) -> Result<StoredNote> {
        let session = self.inner.current_session();
        let note = self
            .inner
            .engine
            .update_note(local_id, draft, session.as_ref())
            .await?;
        self.inner.reload().await?;
        Ok(note)
    }

    pub async fn delete_note(&self, local_id: &LocalId) -> Result<()> {
        let session = self.inner.current_session();
        self.inner
            .engine
            .delete_note(local_id, session.as_ref())
            .await?;
        self.inner.reload().await
    }

    pub async fn archive_note(&self, local_id: &LocalId) -> Result<StoredNote> {
        let session = self.inner.current_session();
        let note = self
            .inner
            .engine
            .archive_note(local_id, session.as_ref())
            .await?;
        self.inner.reload().await?;
        Ok(note)
    }

    pub async fn unarchive_note(&self, local_id: &LocalId) -> Result<StoredNote> {
        let session = self.inner.current_session();
        let note = self
            .inner
            .engine
            .unarchive_note(local_id, session.as_ref())
            .await?;
        self.inner.reload().await?;
        Ok(note)
    }

    pub async fn get_note(&self, local_id: &LocalId) -> Result<Option<StoredNote>> {
        self.inner.engine.get_note(local_id).await
    }

    /// Push one note now. Requires a session and connectivity.
    pub async fn force_sync_note(&self, local_id: &LocalId) -> Result<StoredNote> {
        let session = self.inner.current_session();
        let result = self
            .inner
            .engine
            .force_sync_note(local_id, session.as_ref())
            .await;
        self.inner.reload().await?;
        result
    }
}

impl Drop for NotesFacade {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

impl Inner {
    fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    async fn run(self: Arc<Self>) {
        let mut online = self.engine.network().subscribe();
        let mut sessions = self.session.subscribe();
        let mut events = self.engine.subscribe();

        if *online.borrow_and_update() && sessions.borrow_and_update().is_some() {
            self.auto_sync().await;
        }

        loop {
            tokio::select! {
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let is_online = *online.borrow_and_update();
                    self.set_online(is_online);
                    if is_online {
                        self.auto_sync().await;
                    }
                }
                changed = sessions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let has_session = sessions.borrow_and_update().is_some();
                    if has_session && self.engine.network().is_online() {
                        self.auto_sync().await;
                    }
                }
                event = events.recv() => match event {
                    Ok(state) => self.apply_state(state).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Sync events lagged; reloading");
                        self.apply_state(self.engine.state()).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    async fn auto_sync(&self) {
        let session = self.current_session();
        if let Err(error) = self.engine.sync_notes(session.as_ref()).await {
            tracing::warn!("Automatic sync failed: {}", error);
        }
    }

    async fn apply_state(&self, state: SyncState) {
        let terminal = state.is_terminal();
        self.snapshot.send_modify(|snapshot| snapshot.sync_state = state);
        if terminal {
            if let Err(error) = self.reload().await {
                tracing::warn!("Failed to reload notes after sync: {}", error);
            }
        }
    }

    fn set_online(&self, is_online: bool) {
        self.snapshot.send_if_modified(|snapshot| {
            let changed = snapshot.is_online != is_online;
            snapshot.is_online = is_online;
            changed
        });
    }

    async fn reload_with_loading(&self) -> Result<()> {
        self.snapshot
            .send_modify(|snapshot| snapshot.is_loading = true);
        let result = self.reload().await;
        self.snapshot
            .send_modify(|snapshot| snapshot.is_loading = false);
        result
    }

    async fn reload(&self) -> Result<()> {
        let notes = self.engine.get_all_notes().await?;
        let pending_sync_count = self.engine.pending_count().await?;
        let last_sync = self.engine.last_sync_time().await?;
        let is_online = self.engine.network().is_online();
        let sync_state = self.engine.state();
        self.snapshot.send_modify(|snapshot| {
            snapshot.notes = notes;
            snapshot.pending_sync_count = pending_sync_count;
            snapshot.last_sync_at = (last_sync > 0).then_some(last_sync);
            snapshot.is_online = is_online;
            snapshot.sync_state = sync_state;
        });
        Ok(())
    }
}
