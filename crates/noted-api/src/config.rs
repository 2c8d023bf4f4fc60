use std::collections::HashMap;
use std::env;
use std::fmt;

use thiserror::Error;

pub const BIND_ADDR_ENV: &str = "NOTED_API_BIND_ADDR";
pub const TOKENS_ENV: &str = "NOTED_API_TOKENS";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Accepted bearer tokens mapped to the user id they authenticate
    pub tokens: HashMap<String, String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut users = self.tokens.values().collect::<Vec<_>>();
        users.sort();
        users.dedup();
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("tokens", &"[REDACTED]")
            .field("users", &users)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr =
            optional_trimmed(&lookup, BIND_ADDR_ENV).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let raw_tokens = optional_trimmed(&lookup, TOKENS_ENV).ok_or(ConfigError::MissingVar(TOKENS_ENV))?;
        let tokens = parse_token_pairs(&raw_tokens)?;

        Ok(Self { bind_addr, tokens })
    }
}

/// Parse `token=user_id` pairs separated by commas.
pub fn parse_token_pairs(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut tokens = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let Some((token, user_id)) = pair.split_once('=') else {
            return Err(ConfigError::Invalid(format!(
                "{TOKENS_ENV} entries must look like `token=user_id`"
            )));
        };
        let (token, user_id) = (token.trim(), user_id.trim());
        if token.is_empty() || user_id.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{TOKENS_ENV} entries need both a token and a user id"
            )));
        }
        tokens.insert(token.to_string(), user_id.to_string());
    }

    if tokens.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{TOKENS_ENV} must contain at least one token"
        )));
    }
    Ok(tokens)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
