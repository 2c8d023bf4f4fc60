//! In-memory note storage scoped per user.

use chrono::Utc;
use noted_core::models::DEFAULT_NOTE_COLOR;
use noted_core::Note;
use serde::Deserialize;
use tokio::sync::RwLock;

#[derive(Debug, Default, Deserialize)]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl CreateNoteRequest {
    /// A note needs a non-empty title or content.
    pub fn is_empty(&self) -> bool {
        let blank = |value: &Option<String>| value.as_deref().is_none_or(str::is_empty);
        blank(&self.title) && blank(&self.content)
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Default)]
struct StoreState {
    next_id: u64,
    notes: Vec<Note>,
}

#[derive(Default)]
pub struct NoteStore {
    state: RwLock<StoreState>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self, user_id: &str) -> Vec<Note> {
        self.state
            .read()
            .await
            .notes
            .iter()
            .filter(|note| note.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn get(&self, user_id: &str, id: &str) -> Option<Note> {
        self.state
            .read()
            .await
            .notes
            .iter()
            .find(|note| note.id == id && note.user_id == user_id)
            .cloned()
    }

    pub async fn create(&self, user_id: &str, request: CreateNoteRequest) -> Note {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let now = Utc::now();
        let note = Note {
            id: state.next_id.to_string(),
            title: request.title.unwrap_or_default(),
            content: request.content.unwrap_or_default(),
            color: request
                .color
                .filter(|color| !color.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NOTE_COLOR.to_string()),
            archived: false,
            created_at: now,
            updated_at: now,
            user_id: user_id.to_string(),
        };
        state.notes.push(note.clone());
        note
    }

    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        request: UpdateNoteRequest,
    ) -> Option<Note> {
        self.modify(user_id, id, |note| {
            if let Some(title) = request.title {
                note.title = title;
            }
            if let Some(content) = request.content {
                note.content = content;
            }
            if let Some(color) = request.color {
                note.color = color;
            }
        })
        .await
    }

    pub async fn set_archived(&self, user_id: &str, id: &str, archived: bool) -> Option<Note> {
        self.modify(user_id, id, |note| note.archived = archived)
            .await
    }

    /// Remove and return the note.
    pub async fn delete(&self, user_id: &str, id: &str) -> Option<Note> {
        let mut state = self.state.write().await;
        let index = state
            .notes
            .iter()
            .position(|note| note.id == id && note.user_id == user_id)?;
        Some(state.notes.remove(index))
    }

    async fn modify<F>(&self, user_id: &str, id: &str, apply: F) -> Option<Note>
    where
        F: FnOnce(&mut Note),
    {
        let mut state = self.state.write().await;
        let note = state
            .notes
            .iter_mut()
            .find(|note| note.id == id && note.user_id == user_id)?;
        apply(note);
        note.updated_at = Utc::now();
        Some(note.clone())
    }
}
