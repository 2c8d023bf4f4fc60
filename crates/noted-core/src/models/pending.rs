//! Pending-operation queue entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{LocalId, NoteDraft};
use crate::util::unix_millis_now;

/// Remote mutation waiting to be replayed against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingAction {
    Create,
    Update,
    Delete,
    Archive,
    Unarchive,
}

impl PendingAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Unarchive => "unarchive",
        }
    }
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued mutation, keyed by the target note's local id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Local id of the target note
    pub id: LocalId,
    pub action: PendingAction,
    /// Payload captured at enqueue time (create/update only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_data: Option<NoteDraft>,
    /// Server id captured at enqueue time; needed for deletes since the
    /// local entry is already gone when the queue is drained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Unix ms at enqueue time
    pub timestamp: i64,
}

impl PendingOperation {
    pub fn new(id: LocalId, action: PendingAction) -> Self {
        Self {
            id,
            action,
            note_data: None,
            server_id: None,
            timestamp: unix_millis_now(),
        }
    }

    #[must_use]
    pub fn with_note_data(mut self, draft: NoteDraft) -> Self {
        self.note_data = Some(draft);
        self
    }

    #[must_use]
    pub fn with_server_id(mut self, server_id: Option<&str>) -> Self {
        self.server_id = server_id.map(ToString::to_string);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_operation_serializes_action_lowercase() {
        let op = PendingOperation::new(LocalId::from("local_1"), PendingAction::Unarchive);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["id"], "local_1");
        assert_eq!(json["action"], "unarchive");
        assert!(json.get("noteData").is_none());
    }

    #[test]
    fn pending_operation_reads_payload_without_server_id() {
        let raw = r#"{"id":"local_2","action":"create","noteData":{"title":"A","content":"B"},"timestamp":5}"#;
        let op: PendingOperation = serde_json::from_str(raw).unwrap();
        assert_eq!(op.action, PendingAction::Create);
        assert_eq!(op.note_data.unwrap().title, "A");
        assert_eq!(op.server_id, None);
    }
}
