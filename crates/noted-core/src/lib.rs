//! noted-core - Core library for Noted
//!
//! This crate contains the note models, the local store, and the offline
//! sync engine shared by all Noted interfaces (CLI, API demo clients).

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod facade;
pub mod gateway;
pub mod models;
pub mod network;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use auth::{Session, SessionTokenProvider, StaticTokenProvider};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use facade::{NotesFacade, NotesSnapshot};
pub use gateway::{GatewayError, HttpNoteGateway, NoteGateway};
pub use models::{
    LocalId, Note, NoteDraft, NoteSyncStatus, PendingAction, PendingOperation, StoredNote,
    SyncConflict,
};
pub use network::{ConnectivityCheck, HttpHealthCheck, ManualConnectivity, NetworkMonitor};
pub use state::SyncState;
pub use store::LocalNoteStore;
pub use sync::{SkipReason, SyncEngine, SyncOutcome, SyncReport};
