use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;

use super::*;
use crate::auth::Session;
use crate::db::MemoryKeyValueStore;
use crate::error::Error;
use crate::gateway::testing::{Call, FakeGateway};
use crate::models::{
    LocalId, NoteDraft, NoteSyncStatus, PendingAction, StoredNote, LOCAL_PENDING_WINS,
};
use crate::network::{ManualConnectivity, NetworkMonitor};
use crate::state::SyncState;
use crate::store::LocalNoteStore;

struct Harness {
    engine: Arc<SyncEngine>,
    gateway: FakeGateway,
    connectivity: ManualConnectivity,
    session: Session,
}

impl Harness {
    fn new(online: bool) -> Self {
        let gateway = FakeGateway::new();
        let (monitor, connectivity) = NetworkMonitor::manual(online);
        let store = LocalNoteStore::new(Arc::new(MemoryKeyValueStore::new()));
        let engine = SyncEngine::new(store, Arc::new(gateway.clone()), Arc::new(monitor));
        Self {
            engine: Arc::new(engine),
            gateway,
            connectivity,
            session: Session::new("session-1").unwrap(),
        }
    }

    fn session(&self) -> Option<&Session> {
        Some(&self.session)
    }

    async fn sync(&self) -> SyncReport {
        match self.engine.sync_notes(self.session()).await.unwrap() {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::Skipped(reason) => panic!("sync skipped: {reason:?}"),
        }
    }

    async fn queued_actions(&self) -> Vec<PendingAction> {
        self.engine
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|op| op.action)
            .collect()
    }

    /// Import one server note through a sync and return its local id.
    async fn imported(&self, server_id: &str) -> LocalId {
        self.gateway
            .seed(server_id, "server", Utc::now() - TimeDelta::minutes(5));
        self.sync().await;
        self.engine
            .store()
            .get_by_server_id(server_id)
            .await
            .unwrap()
            .unwrap()
            .local_id
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_create_is_visible_and_queued() {
    let h = Harness::new(false);

    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();

    assert_eq!(note.sync_status, NoteSyncStatus::Pending);
    assert!(note.is_local_only());
    assert_eq!(h.engine.get_all_notes().await.unwrap(), vec![note]);
    assert_eq!(h.queued_actions().await, vec![PendingAction::Create]);
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_create_is_delivered_once_online() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();

    h.connectivity.set_online(true);
    let report = h.sync().await;

    assert_eq!(report.pushed, 1);
    assert_eq!(
        h.gateway.write_calls(),
        vec![Call::Create(NoteDraft::new("A", "B").with_color("#ffffff"))]
    );
    let synced = h.engine.get_note(&note.local_id).await.unwrap().unwrap();
    assert_eq!(synced.sync_status, NoteSyncStatus::Synced);
    assert_eq!(synced.server_id(), Some("srv-1"));
    assert_eq!(h.engine.pending_count().await.unwrap(), 0);
    assert_eq!(h.engine.get_all_notes().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn online_create_syncs_immediately() {
    let h = Harness::new(true);

    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();

    assert_eq!(note.sync_status, NoteSyncStatus::Synced);
    assert_eq!(note.server_id(), Some("srv-1"));
    assert_eq!(h.engine.pending_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn create_without_session_is_queued_even_online() {
    let h = Harness::new(true);

    h.engine
        .create_note(&NoteDraft::new("A", "B"), None)
        .await
        .unwrap();

    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.queued_actions().await, vec![PendingAction::Create]);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_immediate_create_falls_back_to_queue() {
    let h = Harness::new(true);
    h.gateway.fail_writes(true);

    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();

    assert_eq!(note.sync_status, NoteSyncStatus::Pending);
    assert_eq!(h.queued_actions().await, vec![PendingAction::Create]);

    h.gateway.fail_writes(false);
    h.sync().await;
    let synced = h.engine.get_note(&note.local_id).await.unwrap().unwrap();
    assert!(synced.is_synced());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_draft_is_rejected_before_writing() {
    let h = Harness::new(false);

    let result = h
        .engine
        .create_note(&NoteDraft::new("  ", ""), h.session())
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(h.engine.get_all_notes().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn mutators_report_missing_notes() {
    let h = Harness::new(true);
    let missing = LocalId::from("local_missing");

    assert!(matches!(
        h.engine
            .update_note(&missing, &NoteDraft::new("x", "y"), h.session())
            .await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        h.engine.delete_note(&missing, h.session()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        h.engine.archive_note(&missing, h.session()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_sends_current_state_in_order() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("draft", "one"), h.session())
        .await
        .unwrap();
    h.engine
        .update_note(&note.local_id, &NoteDraft::new("final", "two"), h.session())
        .await
        .unwrap();
    h.engine
        .archive_note(&note.local_id, h.session())
        .await
        .unwrap();
    assert_eq!(
        h.queued_actions().await,
        vec![
            PendingAction::Create,
            PendingAction::Update,
            PendingAction::Archive
        ]
    );

    h.connectivity.set_online(true);
    let report = h.sync().await;

    let current = NoteDraft::new("final", "two").with_color("#ffffff");
    assert_eq!(
        h.gateway.write_calls(),
        vec![
            Call::Create(current.clone()),
            Call::Update("srv-1".to_string(), current),
            Call::Archive("srv-1".to_string()),
        ]
    );
    assert_eq!(report.pushed, 3);
    let synced = h.engine.get_note(&note.local_id).await.unwrap().unwrap();
    assert!(synced.is_synced());
    assert!(synced.archived);
    assert!(h.gateway.server_notes()[0].archived);
}

#[tokio::test(flavor = "multi_thread")]
async fn archive_stays_pending_until_its_own_replay() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();
    h.engine
        .archive_note(&note.local_id, h.session())
        .await
        .unwrap();

    h.connectivity.set_online(true);
    h.gateway.fail_archives(true);
    h.sync().await;

    let after_create = h.engine.get_note(&note.local_id).await.unwrap().unwrap();
    assert_eq!(after_create.server_id(), Some("srv-1"));
    assert!(after_create.archived);
    assert_eq!(after_create.sync_status, NoteSyncStatus::Pending);
    assert_eq!(h.queued_actions().await, vec![PendingAction::Archive]);

    h.gateway.fail_archives(false);
    h.sync().await;
    let settled = h.engine.get_note(&note.local_id).await.unwrap().unwrap();
    assert!(settled.archived);
    assert!(settled.is_synced());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_replay_keeps_operations_and_defers_later_ones() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();
    h.engine
        .update_note(&note.local_id, &NoteDraft::new("A2", "B2"), h.session())
        .await
        .unwrap();

    h.connectivity.set_online(true);
    h.gateway.fail_writes(true);
    let report = h.sync().await;

    assert_eq!(report.pushed, 0);
    assert_eq!(report.deferred, 2);
    assert_eq!(
        h.queued_actions().await,
        vec![PendingAction::Create, PendingAction::Update]
    );
    // The update was never attempted after the create failed.
    assert_eq!(h.gateway.write_calls().len(), 1);

    h.gateway.fail_writes(false);
    h.sync().await;
    assert_eq!(h.engine.pending_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_cycles_never_recreate_a_note() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();
    h.connectivity.set_online(true);

    h.engine
        .force_sync_note(&note.local_id, h.session())
        .await
        .unwrap();
    h.sync().await;
    h.sync().await;

    let creates = h
        .gateway
        .write_calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Create(_)))
        .count();
    assert_eq!(creates, 1);
    assert_eq!(h.gateway.server_notes().len(), 1);
    assert_eq!(h.engine.get_all_notes().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_local_only_note_sends_nothing() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();
    h.engine
        .update_note(&note.local_id, &NoteDraft::new("A", "C"), h.session())
        .await
        .unwrap();

    h.engine
        .delete_note(&note.local_id, h.session())
        .await
        .unwrap();
    assert_eq!(h.engine.pending_count().await.unwrap(), 0);

    h.connectivity.set_online(true);
    h.sync().await;
    assert!(h.gateway.write_calls().is_empty());
    assert!(h.engine.get_all_notes().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_delete_of_server_note_is_replayed_without_resurrection() {
    let h = Harness::new(true);
    let local_id = h.imported("42").await;

    h.connectivity.set_online(false);
    h.engine.delete_note(&local_id, h.session()).await.unwrap();
    let queued = h.engine.list_pending().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].server_id.as_deref(), Some("42"));

    h.connectivity.set_online(true);
    h.sync().await;

    assert_eq!(h.gateway.write_calls(), vec![Call::Delete("42".to_string())]);
    assert!(h.gateway.server_notes().is_empty());
    assert!(h.engine.get_all_notes().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_delete_blocks_resurrection_while_failing() {
    let h = Harness::new(true);
    let local_id = h.imported("42").await;
    h.connectivity.set_online(false);
    h.engine.delete_note(&local_id, h.session()).await.unwrap();

    h.connectivity.set_online(true);
    h.gateway.fail_writes(true);
    h.sync().await;

    assert!(h.engine.get_all_notes().await.unwrap().is_empty());
    assert_eq!(h.queued_actions().await, vec![PendingAction::Delete]);
}

#[tokio::test(flavor = "multi_thread")]
async fn online_delete_during_list_fetch_is_not_reimported() {
    let h = Harness::new(true);
    let local_id = h.imported("7").await;
    h.gateway.set_list_delay(Duration::from_millis(200));

    let cycle = {
        let engine = Arc::clone(&h.engine);
        let session = h.session.clone();
        tokio::spawn(async move { engine.sync_notes(Some(&session)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.engine.delete_note(&local_id, h.session()).await.unwrap();
    assert!(h.gateway.server_notes().is_empty());
    assert_eq!(h.engine.pending_count().await.unwrap(), 0);

    let report = match cycle.await.unwrap().unwrap() {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped(reason) => panic!("sync skipped: {reason:?}"),
    };
    assert_eq!(report.inserted, 0);
    assert!(h.engine.get_all_notes().await.unwrap().is_empty());

    // The next fetch no longer lists the note either.
    h.sync().await;
    assert!(h.engine.get_all_notes().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_edits_for_note_deleted_on_server_recreate_it() {
    let h = Harness::new(true);
    let local_id = h.imported("7").await;
    h.gateway.remove("7");

    h.connectivity.set_online(false);
    h.engine
        .update_note(&local_id, &NoteDraft::new("mine", "kept"), h.session())
        .await
        .unwrap();
    h.engine.archive_note(&local_id, h.session()).await.unwrap();
    h.connectivity.set_online(true);

    let first = h.sync().await;
    assert_eq!(first.pushed, 0);
    assert_eq!(first.deferred, 1);
    assert_eq!(
        h.queued_actions().await,
        vec![PendingAction::Create, PendingAction::Archive]
    );
    let detached = h.engine.get_note(&local_id).await.unwrap().unwrap();
    assert!(detached.is_local_only());
    assert_eq!(detached.sync_status, NoteSyncStatus::Pending);

    let second = h.sync().await;
    assert_eq!(second.pushed, 2);
    assert_eq!(h.engine.pending_count().await.unwrap(), 0);

    let note = h.engine.get_note(&local_id).await.unwrap().unwrap();
    assert!(note.is_synced());
    assert_eq!(note.server_id(), Some("srv-1"));
    let server = h.gateway.server_notes();
    assert_eq!(server.len(), 1);
    assert_eq!(server[0].title, "mine");
    assert!(server[0].archived);
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_install_imports_server_notes() {
    let h = Harness::new(true);
    let updated_at = Utc::now() - TimeDelta::hours(1);
    h.gateway.seed("1", "first", updated_at);
    h.gateway.seed("2", "second", updated_at);

    let report = h.sync().await;

    assert_eq!(report.inserted, 2);
    let notes = h.engine.get_all_notes().await.unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().all(StoredNote::is_synced));
    assert_eq!(notes[0].last_modified, updated_at.timestamp_millis());
    assert_eq!(
        h.engine.store().current_user_id().await.unwrap().as_deref(),
        Some("user-1")
    );
    assert!(h.engine.last_sync_time().await.unwrap() > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_remote_overwrites_synced_note() {
    let h = Harness::new(true);
    let local_id = h.imported("7").await;

    h.gateway.seed("7", "edited elsewhere", Utc::now() + TimeDelta::seconds(1));
    let report = h.sync().await;

    assert_eq!(report.refreshed, 1);
    let note = h.engine.get_note(&local_id).await.unwrap().unwrap();
    assert_eq!(note.title, "edited elsewhere");
    assert!(note.is_synced());
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_local_edit_wins_over_newer_remote() {
    let h = Harness::new(true);
    let local_id = h.imported("7").await;

    h.connectivity.set_online(false);
    h.engine
        .update_note(&local_id, &NoteDraft::new("mine", "local"), h.session())
        .await
        .unwrap();
    h.gateway
        .seed("7", "theirs", Utc::now() + TimeDelta::minutes(1));

    h.connectivity.set_online(true);
    h.gateway.fail_writes(true);
    let report = h.sync().await;

    assert_eq!(report.conflicts, 1);
    let note = h.engine.get_note(&local_id).await.unwrap().unwrap();
    assert_eq!(note.title, "mine");
    assert_eq!(note.sync_status, NoteSyncStatus::Pending);

    let conflicts = h.engine.store().list_conflicts(10).await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].note_id, "7");
    assert_eq!(conflicts[0].strategy, LOCAL_PENDING_WINS);
}

#[tokio::test(flavor = "multi_thread")]
async fn drained_update_is_not_undone_by_prefetched_list() {
    let h = Harness::new(true);
    let local_id = h.imported("7").await;

    h.connectivity.set_online(false);
    h.engine
        .update_note(&local_id, &NoteDraft::new("mine", "local"), h.session())
        .await
        .unwrap();
    h.connectivity.set_online(true);
    h.sync().await;

    let note = h.engine.get_note(&local_id).await.unwrap().unwrap();
    assert_eq!(note.title, "mine");
    assert!(note.is_synced());
    assert_eq!(h.gateway.server_notes()[0].title, "mine");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_sync_requests_run_one_cycle() {
    let h = Harness::new(true);
    h.gateway.set_list_delay(Duration::from_millis(150));

    let first = {
        let engine = Arc::clone(&h.engine);
        let session = h.session.clone();
        tokio::spawn(async move { engine.sync_notes(Some(&session)).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = h.engine.sync_notes(h.session()).await.unwrap();

    assert_eq!(second, SyncOutcome::Skipped(SkipReason::AlreadySyncing));
    assert!(!first.await.unwrap().unwrap().is_skipped());
    assert_eq!(h.gateway.list_calls(), 1);
    assert!(!h.engine.is_syncing());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_is_skipped_when_offline_or_unauthenticated() {
    let h = Harness::new(false);
    assert_eq!(
        h.engine.sync_notes(h.session()).await.unwrap(),
        SyncOutcome::Skipped(SkipReason::Offline)
    );

    h.connectivity.set_online(true);
    assert_eq!(
        h.engine.sync_notes(None).await.unwrap(),
        SyncOutcome::Skipped(SkipReason::Unauthenticated)
    );
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_fetch_fails_cycle_and_releases_gate() {
    let h = Harness::new(false);
    h.engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();
    h.connectivity.set_online(true);
    let mut events = h.engine.subscribe();

    h.gateway.fail_list(true);
    let result = h.engine.sync_notes(h.session()).await;

    assert!(matches!(result, Err(Error::Gateway(_))));
    assert_eq!(events.recv().await.unwrap(), SyncState::Syncing);
    assert!(matches!(
        events.recv().await.unwrap(),
        SyncState::Failed { .. }
    ));
    assert_eq!(h.engine.pending_count().await.unwrap(), 1);
    assert_eq!(h.engine.last_sync_time().await.unwrap(), 0);

    h.gateway.fail_list(false);
    h.sync().await;
    assert_eq!(h.engine.pending_count().await.unwrap(), 0);
    assert!(matches!(h.engine.state(), SyncState::Completed { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn force_sync_requires_connectivity_and_session() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();

    assert!(matches!(
        h.engine.force_sync_note(&note.local_id, h.session()).await,
        Err(Error::Offline)
    ));
    h.connectivity.set_online(true);
    assert!(matches!(
        h.engine.force_sync_note(&note.local_id, None).await,
        Err(Error::Unauthenticated)
    ));
    assert!(matches!(
        h.engine
            .force_sync_note(&LocalId::from("local_missing"), h.session())
            .await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn force_sync_creates_then_updates() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();
    h.connectivity.set_online(true);

    let created = h
        .engine
        .force_sync_note(&note.local_id, h.session())
        .await
        .unwrap();
    assert!(created.is_synced());
    assert_eq!(h.engine.pending_count().await.unwrap(), 0);

    let again = h
        .engine
        .force_sync_note(&note.local_id, h.session())
        .await
        .unwrap();
    assert_eq!(again.server_id(), Some("srv-1"));
    assert!(matches!(
        h.gateway.write_calls().last(),
        Some(Call::Update(id, _)) if id == "srv-1"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn force_sync_failure_is_returned() {
    let h = Harness::new(true);
    h.gateway.fail_writes(true);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();

    let result = h.engine.force_sync_note(&note.local_id, h.session()).await;
    assert!(matches!(result, Err(Error::Gateway(_))));
    assert_eq!(h.queued_actions().await, vec![PendingAction::Create]);
}

#[tokio::test(flavor = "multi_thread")]
async fn online_mutation_waits_behind_queued_operations() {
    let h = Harness::new(true);
    let local_id = h.imported("9").await;

    h.connectivity.set_online(false);
    h.engine.archive_note(&local_id, h.session()).await.unwrap();
    h.connectivity.set_online(true);
    let note = h
        .engine
        .unarchive_note(&local_id, h.session())
        .await
        .unwrap();

    assert_eq!(note.sync_status, NoteSyncStatus::Pending);
    assert_eq!(
        h.queued_actions().await,
        vec![PendingAction::Archive, PendingAction::Unarchive]
    );

    h.sync().await;
    assert_eq!(
        h.gateway.write_calls(),
        vec![
            Call::Archive("9".to_string()),
            Call::Unarchive("9".to_string())
        ]
    );
    assert!(!h.gateway.server_notes()[0].archived);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_mutations_on_one_note_do_not_lose_writes() {
    let h = Harness::new(false);
    let note = h
        .engine
        .create_note(&NoteDraft::new("A", "B"), h.session())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for index in 0..10 {
        let engine = Arc::clone(&h.engine);
        let local_id = note.local_id.clone();
        handles.push(tokio::spawn(async move {
            if index == 5 {
                engine.archive_note(&local_id, None).await.map(|_| ())
            } else {
                engine
                    .update_note(&local_id, &NoteDraft::new(format!("t{index}"), "c"), None)
                    .await
                    .map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = h.engine.get_note(&note.local_id).await.unwrap().unwrap();
    assert!(stored.archived);
    assert!(stored.title.starts_with('t'));
    assert_eq!(h.engine.pending_count().await.unwrap(), 11);
}

#[tokio::test(flavor = "multi_thread")]
async fn cycle_events_end_with_completed() {
    let h = Harness::new(true);
    let mut events = h.engine.subscribe();

    h.sync().await;

    assert_eq!(events.recv().await.unwrap(), SyncState::Syncing);
    assert!(matches!(
        events.recv().await.unwrap(),
        SyncState::Completed { .. }
    ));
}
