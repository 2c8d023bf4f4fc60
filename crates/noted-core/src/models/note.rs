//! Note models: the server's canonical note and the local stored copy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::to_epoch_millis;

/// Color applied when a draft does not pick one.
pub const DEFAULT_NOTE_COLOR: &str = "#ffffff";

const LOCAL_ID_PREFIX: &str = "local_";

/// Client-generated identity of a stored note.
///
/// Built from a UUID v7 so ids are time-ordered and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Generate a fresh local id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LocalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LocalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Per-note synchronization status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteSyncStatus {
    /// Local copy matches what the server last acknowledged
    Synced,
    /// Local mutations not yet confirmed by the server
    Pending,
    /// Local and remote copies diverged
    Conflict,
}

impl NoteSyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for NoteSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Server-assigned identifier
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: String,
}

fn default_color() -> String {
    DEFAULT_NOTE_COLOR.to_string()
}

/// User-supplied note fields for create and update requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            color: None,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Reject drafts where both title and content are blank.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() && self.content.trim().is_empty() {
            return Err(Error::InvalidInput(
                "note must have either a title or content".to_string(),
            ));
        }
        if self.color.as_deref().is_some_and(|color| color.trim().is_empty()) {
            return Err(Error::InvalidInput("note color must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Local superset of [`Note`], keyed by [`LocalId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNote {
    /// Server id; `None` until the first successful create on the server
    #[serde(default)]
    pub id: Option<String>,
    pub local_id: LocalId,
    pub title: String,
    pub content: String,
    pub color: String,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: String,
    /// Unix ms of the last local mutation
    pub last_modified: i64,
    pub sync_status: NoteSyncStatus,
}

impl StoredNote {
    /// Build a pending, local-only note from a draft.
    #[must_use]
    pub fn new_local(draft: &NoteDraft, default_color: &str, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            local_id: LocalId::generate(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            color: draft
                .color
                .clone()
                .unwrap_or_else(|| default_color.to_string()),
            archived: false,
            created_at: now,
            updated_at: now,
            user_id: user_id.into(),
            last_modified: to_epoch_millis(&now),
            sync_status: NoteSyncStatus::Pending,
        }
    }

    /// Build a synced local copy of a note first seen on the server.
    #[must_use]
    pub fn from_remote(note: &Note) -> Self {
        Self {
            id: Some(note.id.clone()),
            local_id: LocalId::generate(),
            title: note.title.clone(),
            content: note.content.clone(),
            color: note.color.clone(),
            archived: note.archived,
            created_at: note.created_at,
            updated_at: note.updated_at,
            user_id: note.user_id.clone(),
            last_modified: to_epoch_millis(&note.updated_at),
            sync_status: NoteSyncStatus::Synced,
        }
    }

    /// Server id, if the server has acknowledged this note.
    #[must_use]
    pub fn server_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// True when the server has never acknowledged this note.
    #[must_use]
    pub fn is_local_only(&self) -> bool {
        self.server_id().is_none()
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.sync_status == NoteSyncStatus::Synced
    }

    /// Payload sent to the server for create/update.
    #[must_use]
    pub fn to_draft(&self) -> NoteDraft {
        NoteDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            color: Some(self.color.clone()),
        }
    }

    /// Apply a local edit, marking the note pending.
    pub fn apply_edit(&mut self, draft: &NoteDraft) {
        let now = Utc::now();
        self.title.clone_from(&draft.title);
        self.content.clone_from(&draft.content);
        if let Some(color) = &draft.color {
            self.color.clone_from(color);
        }
        self.updated_at = now;
        self.touch_pending(to_epoch_millis(&now));
    }

    /// Set the archived flag locally, marking the note pending.
    pub fn apply_archived(&mut self, archived: bool) {
        self.archived = archived;
        self.touch_pending(Utc::now().timestamp_millis());
    }

    /// Record server acknowledgement of this note.
    ///
    /// Server id and timestamps are taken from the response; local field
    /// values are kept since they are what was just sent. `last_modified`
    /// moves up to the acknowledged time so remote copies fetched before the
    /// acknowledgement never look newer.
    pub fn acknowledge(&mut self, remote: &Note) {
        self.adopt_server_identity(remote);
        self.updated_at = remote.updated_at;
        self.last_modified = self.last_modified.max(to_epoch_millis(&remote.updated_at));
        self.archived = remote.archived;
        self.sync_status = NoteSyncStatus::Synced;
    }

    /// Take the server id and creation metadata without touching local
    /// state. Used when later mutations for this note are still queued.
    pub fn adopt_server_identity(&mut self, remote: &Note) {
        self.id = Some(remote.id.clone());
        self.created_at = remote.created_at;
        if !remote.user_id.is_empty() {
            self.user_id.clone_from(&remote.user_id);
        }
    }

    /// Forget the server copy; the note goes back to being local-only.
    pub fn detach_from_server(&mut self) {
        self.id = None;
        self.sync_status = NoteSyncStatus::Pending;
    }

    /// Overwrite local fields from a newer server copy.
    pub fn overwrite_from_remote(&mut self, remote: &Note) {
        self.title.clone_from(&remote.title);
        self.content.clone_from(&remote.content);
        self.color.clone_from(&remote.color);
        self.archived = remote.archived;
        self.updated_at = remote.updated_at;
        self.last_modified = to_epoch_millis(&remote.updated_at);
        self.sync_status = NoteSyncStatus::Synced;
    }

    fn touch_pending(&mut self, now_ms: i64) {
        // Keep last_modified strictly increasing for back-to-back edits.
        self.last_modified = now_ms.max(self.last_modified + 1);
        self.sync_status = NoteSyncStatus::Pending;
    }

    /// First line of the title (or content), truncated to `max_len` characters.
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            &self.content
        } else {
            &self.title
        };
        source
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}
