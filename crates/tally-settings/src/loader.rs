//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TallySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `TALLY_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{Driver, SslMode, TallySettings};

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "TALLY_SETTINGS";

/// Resolve the settings file path.
///
/// `TALLY_SETTINGS` wins; otherwise `~/.tally/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string(SETTINGS_PATH_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tally").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TallySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON, an unknown driver, or a
/// database section that cannot open is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TallySettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env<F>(path: &Path, env: F) -> Result<TallySettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(TallySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TallySettings = serde_json::from_value(merged)?;
    apply_overrides_from(&mut settings, env)?;
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut TallySettings) -> Result<()> {
    apply_overrides_from(settings, |name| std::env::var(name).ok())
}

/// Apply overrides read through `env`.
///
/// Numeric values outside their range are ignored with a warning. An unknown
/// driver or ssl mode is an error: connecting to the wrong backend must not
/// happen quietly.
pub fn apply_overrides_from<F>(settings: &mut TallySettings, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| env(name).filter(|v| !v.is_empty());
    let details = &mut settings.database.connection_details;

    if let Some(v) = read("TALLY_DB_DRIVER") {
        settings.database.driver = v.parse::<Driver>()?;
    }
    if let Some(v) = read("TALLY_DB_HOST") {
        details.host = v;
    }
    if let Some(v) = read("TALLY_DB_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => details.port = port,
            None => warn_invalid("TALLY_DB_PORT", &v),
        }
    }
    if let Some(v) = read("TALLY_DB_USER") {
        details.username = v;
    }
    if let Some(v) = read("TALLY_DB_PASSWORD") {
        details.password = Some(SecretString::from(v));
    }
    if let Some(v) = read("TALLY_DB_NAME") {
        details.database = v;
    }
    if let Some(v) = read("TALLY_DB_SSLMODE") {
        details.ssl_mode = v.parse::<SslMode>()?;
    }
    if let Some(v) = read("TALLY_DB_MAX_CONNECTIONS") {
        match parse_u32_range(&v, 1, 1024) {
            Some(n) => details.max_connections = n,
            None => warn_invalid("TALLY_DB_MAX_CONNECTIONS", &v),
        }
    }
    if let Some(v) = read("TALLY_MIGRATION_DIR") {
        settings.migrations.dir = PathBuf::from(v);
    }
    if let Some(v) = read("TALLY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("TALLY_LOG_JSON") {
        match parse_bool(&v) {
            Some(json) => settings.logging.json = json,
            None => warn_invalid("TALLY_LOG_JSON", &v),
        }
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn warn_invalid(name: &str, value: &str) {
    tracing::warn!(key = name, value = %value, "invalid env var, ignoring");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
