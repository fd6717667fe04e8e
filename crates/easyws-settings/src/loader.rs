//! Layered settings: compiled defaults, then `~/.easyws/settings.json`,
//! then `EASYWS_*` environment variables. The result is validated before it
//! is returned.
//!
//! The file only needs the keys it changes. Nested objects merge key by key,
//! any other value replaces the default, and `null` leaves the default in
//! place.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::EasyWsSettings;

/// Upper bound accepted for queue capacities from the environment.
const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Resolve the path to the settings file (`~/.easyws/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".easyws").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EasyWsSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<EasyWsSettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<EasyWsSettings> {
    let mut merged = serde_json::to_value(EasyWsSettings::default())?;
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        merge_into(&mut merged, serde_json::from_str(&content)?);
        debug!(path = %path.display(), "merged settings file");
    } else {
        debug!(path = %path.display(), "no settings file, using defaults");
    }
    Ok(serde_json::from_value(merged)?)
}

/// Overlay `overlay` onto `base` in place.
pub fn merge_into(base: &mut Value, overlay: Value) {
    let Value::Object(entries) = overlay else {
        *base = overlay;
        return;
    };
    let Value::Object(base_map) = base else {
        *base = Value::Object(entries);
        return;
    };
    for (key, value) in entries.into_iter().filter(|(_, v)| !v.is_null()) {
        match base_map.get_mut(&key) {
            Some(slot) => merge_into(slot, value),
            None => {
                let _ = base_map.insert(key, value);
            }
        }
    }
}

/// Reject values the session manager cannot run with.
pub fn validate(settings: &EasyWsSettings) -> Result<()> {
    let checks = [
        ("queues.messageCapacity", settings.queues.message_capacity),
        ("queues.eventCapacity", settings.queues.event_capacity),
        ("server.maxMessageSize", settings.server.max_message_size),
        ("client.maxMessageSize", settings.client.max_message_size),
    ];
    if let Some(&(field, _)) = checks.iter().find(|(_, value)| *value == 0) {
        return Err(SettingsError::invalid(field, "must be at least 1"));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Booleans accept `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut EasyWsSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides<F>(settings: &mut EasyWsSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("EASYWS_LOG_LEVEL").filter(|v| !v.is_empty()) {
        settings.log.level = v;
    }
    if let Some(v) = read_with(&lookup, "EASYWS_LOG_JSON", parse_bool) {
        settings.log.json = v;
    }
    if let Some(v) = read_with(&lookup, "EASYWS_MESSAGE_QUEUE", |s| {
        parse_usize_range(s, 1, MAX_QUEUE_CAPACITY)
    }) {
        settings.queues.message_capacity = v;
    }
    if let Some(v) = read_with(&lookup, "EASYWS_EVENT_QUEUE", |s| {
        parse_usize_range(s, 1, MAX_QUEUE_CAPACITY)
    }) {
        settings.queues.event_capacity = v;
    }
    if let Some(v) = read_with(&lookup, "EASYWS_SKIP_VERIFY", parse_bool) {
        settings.client.skip_verify = v;
    }
    if let Some(v) = read_with(&lookup, "EASYWS_MAX_MESSAGE_SIZE", |s| {
        parse_usize_range(s, 1, usize::MAX)
    }) {
        settings.server.max_message_size = v;
        settings.client.max_message_size = v;
    }
}

fn read_with<F, T, P>(lookup: &F, name: &str, parse: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let val = lookup(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

const TRUTHY: [&str; 4] = ["1", "true", "yes", "on"];
const FALSY: [&str; 4] = ["0", "false", "no", "off"];

/// Boolean env value, ignoring ASCII case and surrounding whitespace.
pub fn parse_bool(val: &str) -> Option<bool> {
    let val = val.trim();
    if TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(val)) {
        Some(true)
    } else if FALSY.iter().any(|f| f.eq_ignore_ascii_case(val)) {
        Some(false)
    } else {
        None
    }
}

/// Integer env value within `min..=max`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    val.trim()
        .parse()
        .ok()
        .filter(|n| (min..=max).contains(n))
}
