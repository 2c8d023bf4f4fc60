//! Client configuration shared by every Noted frontend.
//!
//! Values come from defaults, an optional serialized config, and finally
//! `NOTED_*` environment overrides. Bearer tokens are never stored here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::DEFAULT_NOTE_COLOR;
use crate::util::{normalize_base_url, normalize_text_option};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:4000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 4;

pub const ENV_API_URL: &str = "NOTED_API_URL";
pub const ENV_POLL_INTERVAL_SECS: &str = "NOTED_POLL_INTERVAL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "NOTED_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Connectivity sampling interval for polling monitors
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub health_timeout_secs: u64,
    /// Color applied to notes created without one
    pub default_color: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            health_timeout_secs: DEFAULT_HEALTH_TIMEOUT_SECS,
            default_color: DEFAULT_NOTE_COLOR.to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults with process environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (keyed by `NOTED_*` variable name) and
    /// validate the result.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api_base_url = url;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_POLL_INTERVAL_SECS)? {
            self.poll_interval_secs = secs;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            self.request_timeout_secs = secs;
        }
        self.validated()
    }

    /// Normalize URLs and reject zero intervals or a blank color.
    pub fn validated(mut self) -> Result<Self> {
        self.api_base_url = normalize_base_url(&self.api_base_url).map_err(Error::InvalidInput)?;
        if self.poll_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "poll interval must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 || self.health_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "timeouts must be at least 1 second".to_string(),
            ));
        }
        self.default_color = normalize_text_option(Some(self.default_color))
            .ok_or_else(|| Error::InvalidInput("default color must not be empty".to_string()))?;
        Ok(self)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}/api/health", self.api_base_url)
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = normalize_text_option(lookup(key)) else {
        return Ok(None);
    };
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| Error::InvalidInput(format!("{key} must be a whole number of seconds")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:4000");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.default_color, "#ffffff");
        assert_eq!(config.health_url(), "http://localhost:4000/api/health");
    }

    #[test]
    fn overrides_are_applied_and_normalized() {
        let config = ClientConfig::default()
            .with_overrides(lookup(&[
                (ENV_API_URL, " https://notes.example.com/ "),
                (ENV_POLL_INTERVAL_SECS, "30"),
            ]))
            .unwrap();
        assert_eq!(config.api_base_url, "https://notes.example.com");
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        assert!(ClientConfig::default()
            .with_overrides(lookup(&[(ENV_POLL_INTERVAL_SECS, "soon")]))
            .is_err());
        assert!(ClientConfig::default()
            .with_overrides(lookup(&[(ENV_POLL_INTERVAL_SECS, "0")]))
            .is_err());
        assert!(ClientConfig::default()
            .with_overrides(lookup(&[(ENV_API_URL, "notes.example.com")]))
            .is_err());
    }

    #[test]
    fn deserialize_rejects_unknown_fields_and_fills_defaults() {
        let parsed: ClientConfig =
            serde_json::from_str(r#"{"api_base_url":"http://10.0.2.2:4000"}"#).unwrap();
        assert_eq!(parsed.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);

        let error = serde_json::from_str::<ClientConfig>(r#"{"sync_url":"x"}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }
}
