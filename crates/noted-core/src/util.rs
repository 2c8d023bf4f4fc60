//! Shared utility functions used across multiple modules.

use chrono::{DateTime, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Normalize an HTTP base URL: trimmed, scheme required, no trailing slash.
pub fn normalize_base_url(raw: &str) -> Result<String, String> {
    let value = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| "base URL must not be empty".to_string())?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(format!("base URL '{value}' must include http:// or https://"))
    }
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a UTC timestamp into epoch milliseconds.
pub fn to_epoch_millis(value: &DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}
