//! In-process gateway used by engine and facade tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{GatewayError, GatewayResult, NoteGateway};
use crate::auth::Session;
use crate::models::{Note, NoteDraft, DEFAULT_NOTE_COLOR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create(NoteDraft),
    Update(String, NoteDraft),
    Delete(String),
    Archive(String),
    Unarchive(String),
}

#[derive(Default)]
struct State {
    notes: Vec<Note>,
    calls: Vec<Call>,
    next_id: u64,
}

/// Server double: stores notes in memory, records every call, and can be
/// told to fail.
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<State>>,
    fail_writes: Arc<AtomicBool>,
    fail_list: Arc<AtomicBool>,
    fail_archives: Arc<AtomicBool>,
    list_delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_archives(&self, fail: bool) {
        self.fail_archives.store(fail, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::List)
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::List)
            .count()
    }

    pub fn server_notes(&self) -> Vec<Note> {
        self.state.lock().unwrap().notes.clone()
    }

    /// Delete a note on the server directly, as another device would.
    pub fn remove(&self, id: &str) {
        self.state.lock().unwrap().notes.retain(|note| note.id != id);
    }

    /// Put a note on the server directly, bypassing call recording.
    pub fn seed(&self, id: &str, title: &str, updated_at: DateTime<Utc>) -> Note {
        let note = Note {
            id: id.to_string(),
            title: title.to_string(),
            content: format!("{title} content"),
            color: DEFAULT_NOTE_COLOR.to_string(),
            archived: false,
            created_at: updated_at,
            updated_at,
            user_id: "user-1".to_string(),
        };
        let mut state = self.state.lock().unwrap();
        state.notes.retain(|existing| existing.id != id);
        state.notes.push(note.clone());
        note
    }

    fn record(&self, call: Call) -> GatewayResult<()> {
        let failing = match call {
            Call::List => self.fail_list.load(Ordering::SeqCst),
            Call::Archive(_) | Call::Unarchive(_) => {
                self.fail_writes.load(Ordering::SeqCst)
                    || self.fail_archives.load(Ordering::SeqCst)
            }
            _ => self.fail_writes.load(Ordering::SeqCst),
        };
        self.state.lock().unwrap().calls.push(call);
        if failing {
            return Err(GatewayError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn modify(&self, id: &str, apply: impl FnOnce(&mut Note)) -> GatewayResult<Note> {
        let mut state = self.state.lock().unwrap();
        let note = state
            .notes
            .iter_mut()
            .find(|note| note.id == id)
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: "Note not found".to_string(),
            })?;
        apply(note);
        note.updated_at = Utc::now();
        Ok(note.clone())
    }
}

#[async_trait]
impl NoteGateway for FakeGateway {
    async fn list_notes(&self, _session: &Session) -> GatewayResult<Vec<Note>> {
        self.record(Call::List)?;
        // The response reflects the server at request time, not at arrival.
        let snapshot = self.server_notes();
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn create_note(&self, _session: &Session, draft: &NoteDraft) -> GatewayResult<Note> {
        self.record(Call::Create(draft.clone()))?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let now = Utc::now();
        let note = Note {
            id: format!("srv-{}", state.next_id),
            title: draft.title.clone(),
            content: draft.content.clone(),
            color: draft
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_NOTE_COLOR.to_string()),
            archived: false,
            created_at: now,
            updated_at: now,
            user_id: "user-1".to_string(),
        };
        state.notes.push(note.clone());
        Ok(note)
    }

    async fn update_note(
        &self,
        _session: &Session,
        id: &str,
        draft: &NoteDraft,
    ) -> GatewayResult<Note> {
        self.record(Call::Update(id.to_string(), draft.clone()))?;
        self.modify(id, |note| {
            note.title.clone_from(&draft.title);
            note.content.clone_from(&draft.content);
            if let Some(color) = &draft.color {
                note.color.clone_from(color);
            }
        })
    }

    async fn delete_note(&self, _session: &Session, id: &str) -> GatewayResult<()> {
        self.record(Call::Delete(id.to_string()))?;
        let mut state = self.state.lock().unwrap();
        let before = state.notes.len();
        state.notes.retain(|note| note.id != id);
        if state.notes.len() == before {
            return Err(GatewayError::Api {
                status: 404,
                message: "Note not found".to_string(),
            });
        }
        Ok(())
    }

    async fn archive_note(&self, _session: &Session, id: &str) -> GatewayResult<Note> {
        self.record(Call::Archive(id.to_string()))?;
        self.modify(id, |note| note.archived = true)
    }

    async fn unarchive_note(&self, _session: &Session, id: &str) -> GatewayResult<Note> {
        self.record(Call::Unarchive(id.to_string()))?;
        self.modify(id, |note| note.archived = false)
    }
}
