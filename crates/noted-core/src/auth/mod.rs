//! Session-token capability used by the remote gateway.
//!
//! Token issuance and refresh live outside this crate. The engine only needs
//! to turn a session id into a bearer credential at call time.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::util::normalize_text_option;

/// An authenticated session, identified by an opaque id.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Session {
    session_id: String,
}

impl Session {
    /// Returns `None` when the id is blank.
    pub fn new(session_id: impl Into<String>) -> Option<Self> {
        normalize_text_option(Some(session_id.into())).map(|session_id| Self { session_id })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.session_id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No access token available for session {0}")]
    MissingToken(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Resolves a bearer token for a session id.
#[async_trait]
pub trait SessionTokenProvider: Send + Sync {
    async fn access_token(&self, session: &Session) -> AuthResult<String>;
}

/// In-process token map. Useful for tests and for hosts that already hold
/// the token in memory.
#[derive(Clone, Default)]
pub struct StaticTokenProvider {
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticTokenProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with a single session already registered.
    pub fn with_token(session: &Session, token: impl Into<String>) -> Self {
        let provider = Self::new();
        provider.insert(session, token);
        provider
    }

    pub fn insert(&self, session: &Session, token: impl Into<String>) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(session.id().to_string(), token.into());
        }
    }

    pub fn remove(&self, session: &Session) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.remove(session.id());
        }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sessions = self.tokens.read().map_or(0, |tokens| tokens.len());
        formatter
            .debug_struct("StaticTokenProvider")
            .field("tokens", &"[REDACTED]")
            .field("sessions", &sessions)
            .finish()
    }
}

#[async_trait]
impl SessionTokenProvider for StaticTokenProvider {
    async fn access_token(&self, session: &Session) -> AuthResult<String> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| AuthError::SecureStorage("token map lock poisoned".to_string()))?;
        tokens
            .get(session.id())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::MissingToken(session.id().to_string()))
    }
}
