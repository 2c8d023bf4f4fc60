use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Static bearer-token table loaded from configuration.
#[derive(Clone)]
pub struct TokenAuthenticator {
    tokens: Arc<HashMap<String, String>>,
}

impl TokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }

    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        self.tokens
            .get(token)
            .map(|user_id| AuthenticatedUser {
                user_id: user_id.clone(),
            })
            .ok_or_else(|| AppError::unauthorized("Invalid or expired token"))
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}
