//! Data models for Noted

mod note;
mod pending;
mod sync_conflict;

pub use note::{LocalId, Note, NoteDraft, NoteSyncStatus, StoredNote, DEFAULT_NOTE_COLOR};
pub use pending::{PendingAction, PendingOperation};
pub use sync_conflict::{SyncConflict, LOCAL_PENDING_WINS};
