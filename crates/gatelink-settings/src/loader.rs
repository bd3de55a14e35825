//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GatelinkSettings::default()`]
//! 2. If `~/.gatelink/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `GATELINK_*` environment overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::GatelinkSettings;

/// Resolve the path to the settings file (`~/.gatelink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".gatelink").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GatelinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<GatelinkSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<GatelinkSettings> {
    let defaults = serde_json::to_value(GatelinkSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject settings the engines cannot run with.
pub fn validate(settings: &GatelinkSettings) -> Result<()> {
    if settings.rest.retry_count == 0 {
        return Err(SettingsError::InvalidValue(
            "rest.retryCount must be at least 1".into(),
        ));
    }
    if settings.rest.connection_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "rest.connectionTimeoutMs must be positive".into(),
        ));
    }
    if settings.gateway.url.is_empty() {
        return Err(SettingsError::InvalidValue("gateway.url is empty".into()));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_env_overrides(settings: &mut GatelinkSettings) {
    // ── Request engine ──────────────────────────────────────────────
    if let Some(v) = read_env_string("GATELINK_TOKEN") {
        settings.rest.authorization = Some(v);
    }
    if let Some(v) = read_env_string("GATELINK_API_URL") {
        settings.rest.base_url = v;
    }
    if let Some(v) = read_env_u64("GATELINK_TIMEOUT_MS", 1, 600_000) {
        settings.rest.connection_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("GATELINK_RETRY_COUNT", 1, 100) {
        settings.rest.retry_count = u32::try_from(v).unwrap_or(settings.rest.retry_count);
    }

    // ── Sessions ────────────────────────────────────────────────────
    if let Some(v) = read_env_string("GATELINK_GATEWAY_URL") {
        settings.gateway.url = v;
    }
    if let Some(v) = read_env_u64("GATELINK_INTENTS", 0, u64::MAX) {
        settings.gateway.intents = v;
    }
    if let Some(v) = read_env_u64("GATELINK_SETTLE_DELAY_MS", 0, 60_000) {
        settings.gateway.settle_delay_ms = v;
        settings.media.settle_delay_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("GATELINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("GATELINK_LOG_FORMAT") {
        match serde_json::from_value(Value::String(v.clone())) {
            Ok(format) => settings.logging.format = format,
            Err(_) => tracing::warn!(key = "GATELINK_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
