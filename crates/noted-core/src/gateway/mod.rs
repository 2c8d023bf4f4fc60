//! Remote note gateway: the authenticated CRUD contract the sync engine
//! replays local mutations against.
//!
//! Gateways never retry. A failed call is reported to the engine, which keeps
//! the mutation in the pending queue for the next cycle.

mod http;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::{AuthError, Session};
use crate::models::{Note, NoteDraft};

pub use http::HttpNoteGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Notes API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Invalid notes API payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfiguration(String),
}

impl GatewayError {
    /// True when the server rejected the credential.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Api { status: 401 | 403, .. })
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait NoteGateway: Send + Sync {
    async fn list_notes(&self, session: &Session) -> GatewayResult<Vec<Note>>;

    async fn create_note(&self, session: &Session, draft: &NoteDraft) -> GatewayResult<Note>;

    async fn update_note(
        &self,
        session: &Session,
        id: &str,
        draft: &NoteDraft,
    ) -> GatewayResult<Note>;

    async fn delete_note(&self, session: &Session, id: &str) -> GatewayResult<()>;

    async fn archive_note(&self, session: &Session, id: &str) -> GatewayResult<Note>;

    async fn unarchive_note(&self, session: &Session, id: &str) -> GatewayResult<Note>;
}
