//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use noted_core::util::{is_http_url, normalize_text_option};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "cli-config.json";
const APP_DIR_NAME: &str = "noted";
pub const PROFILE_ENV: &str = "NOTED_PROFILE";
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Session used for sync; its bearer token lives in the OS keychain
    #[serde(default)]
    pub session_id: Option<String>,
}

const fn default_config_version() -> u32 {
    1
}

fn app_dir(base: Option<PathBuf>, kind: &str) -> Result<PathBuf, String> {
    base.map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| format!("Failed to resolve CLI {kind} directory"))
}

pub fn default_config_path() -> Result<PathBuf, String> {
    app_dir(dirs::config_dir(), "config").map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Local database path for a profile; each profile keeps its own notes.
pub fn default_db_path(profile_name: &str) -> Result<PathBuf, String> {
    let file_name = if profile_name == DEFAULT_PROFILE {
        "noted.db".to_string()
    } else {
        format!("noted-{profile_name}.db")
    };
    app_dir(dirs::data_dir(), "data").map(|dir| dir.join(file_name))
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Pick the profile: explicit flag, then `NOTED_PROFILE`, then the saved
    /// active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with(explicit, std::env::var(PROFILE_ENV).ok().as_deref())
    }

    pub fn resolve_profile_name_with(&self, explicit: Option<&str>, env: Option<&str>) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(env))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    pub fn api_base_url(&self) -> Option<String> {
        normalize_text_option(self.api_base_url.clone())
    }

    pub fn session_id(&self) -> Option<String> {
        normalize_text_option(self.session_id.clone())
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.api_base_url() {
            if !is_http_url(&url) {
                return Err("api_base_url must include http:// or https://".to_string());
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.api_base_url = self
            .api_base_url()
            .map(|url| url.trim_end_matches('/').to_string());
        self.session_id = self.session_id();
    }
}
