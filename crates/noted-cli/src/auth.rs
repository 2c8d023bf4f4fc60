//! Bearer-token persistence for CLI sessions, backed by the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
#[cfg(not(test))]
use keyring::Entry;
use noted_core::auth::{AuthError, AuthResult, SessionTokenProvider};
use noted_core::Session;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "noted-cli";

/// Keychain slot holding the bearer token of one session.
#[derive(Clone)]
struct TokenSlot {
    username: String,
}

impl TokenSlot {
    fn new(session_id: &str) -> Self {
        Self {
            username: format!("session_token:{session_id}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }

    #[cfg(not(test))]
    fn load(&self) -> AuthResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load(&self) -> AuthResult<Option<String>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    fn save(&self, token: &str) -> AuthResult<()> {
        self.entry()?
            .set_password(token)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save(&self, token: &str) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn clear(&self) -> AuthResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear(&self) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

pub fn store_session_token(session: &Session, token: &str) -> AuthResult<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken(session.id().to_string()));
    }
    TokenSlot::new(session.id()).save(token)
}

pub fn load_session_token(session: &Session) -> AuthResult<Option<String>> {
    TokenSlot::new(session.id()).load()
}

pub fn clear_session_token(session: &Session) -> AuthResult<()> {
    TokenSlot::new(session.id()).clear()
}

/// Token provider reading from the keychain on every request, so a token
/// replaced by `noted auth login` is picked up without restarting.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringTokenProvider;

#[async_trait]
impl SessionTokenProvider for KeyringTokenProvider {
    async fn access_token(&self, session: &Session) -> AuthResult<String> {
        load_session_token(session)?.ok_or_else(|| AuthError::MissingToken(session.id().to_string()))
    }
}
