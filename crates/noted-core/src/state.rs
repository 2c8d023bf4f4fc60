//! Sync cycle state shared by the engine, facade and clients.

use serde::Serialize;

/// Lifecycle of a sync cycle: `Idle -> Syncing -> Completed | Failed`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    /// Cycle finished; `at` is the completion time in Unix ms.
    Completed { at: i64 },
    Failed { error: String },
}

impl SyncState {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

