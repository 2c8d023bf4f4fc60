//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::LocalId;

/// Strategy recorded when a pending local edit outlives a newer server copy.
pub const LOCAL_PENDING_WINS: &str = "local-pending-wins";

/// Divergence observed during a merge and the way it was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub local_id: LocalId,
    /// Server id of the note involved in the conflict
    pub note_id: String,
    /// Local `lastModified` when the conflict occurred
    pub local_updated_at: i64,
    /// Incoming server `updatedAt` that was not applied
    pub incoming_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
