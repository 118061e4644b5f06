//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PairlinkSettings::default()`]
//! 2. If `~/.pairlink/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::PairlinkSettings;

/// `~/.pairlink`, falling back to `/tmp/.pairlink` without a HOME.
pub fn pairlink_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".pairlink")
}

/// Resolve the path to the settings file (`~/.pairlink/settings.json`).
pub fn settings_path() -> PathBuf {
    pairlink_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PairlinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<PairlinkSettings> {
    let mut settings = load_file(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn load_file(path: &Path) -> Result<PairlinkSettings> {
    let defaults = serde_json::to_value(PairlinkSettings::default())?;

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

/// Apply overrides from an environment-like lookup.
///
/// Empty values are treated as unset. Values that fail to parse are ignored
/// with a warning and the file/default value is kept.
pub fn apply_overrides(settings: &mut PairlinkSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("PAIRLINK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("PAIRLINK_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => warn_invalid("PAIRLINK_PORT", &v),
        }
    }
    if let Some(v) = read("PAIRLINK_STATIC_DIR") {
        settings.server.static_dir = Some(v);
    }

    // ── Persistence ─────────────────────────────────────────────────
    if let Some(v) = read("PAIRLINK_DB_PATH") {
        settings.persistence.db_path = v;
    }
    if let Some(v) = read("PAIRLINK_PERSISTENCE") {
        match parse_bool(&v) {
            Some(enabled) => settings.persistence.enabled = enabled,
            None => warn_invalid("PAIRLINK_PERSISTENCE", &v),
        }
    }

    // ── Notifications ───────────────────────────────────────────────
    if let Some(v) = read("ONESIGNAL_APP_ID") {
        settings.push.app_id = Some(v);
    }
    if let Some(v) = read("ONESIGNAL_API_KEY") {
        settings.push.api_key = Some(v);
    }
    if let Some(v) = read("PAIRLINK_EMAIL_ENDPOINT") {
        settings.email.endpoint = Some(v);
    }
    if let Some(v) = read("PAIRLINK_EMAIL_API_KEY") {
        settings.email.api_key = Some(v);
    }
    if let Some(v) = read("PAIRLINK_EMAIL_FROM") {
        settings.email.from = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("PAIRLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("PAIRLINK_LOG_JSON") {
        match parse_bool(&v) {
            Some(json) => settings.logging.json = json,
            None => warn_invalid("PAIRLINK_LOG_JSON", &v),
        }
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env override, ignoring");
}

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
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 4000, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_new_keys_added() {
        let target = serde_json::json!({"push": {"heading": "Alert"}});
        let source = serde_json::json!({"push": {"apiKey": "k"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["push"]["heading"], "Alert");
        assert_eq!(merged["push"]["apiKey"], "k");
    }

    // ── load_file ───────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 4000);
        assert!(settings.persistence.enabled);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "push": {"appId": "app-1", "apiKey": "key-1"}}"#,
        )
        .unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.max_send_queue, 256);
        assert!(settings.push.is_configured());
        assert_eq!(settings.push.heading, "Alert");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        assert!(matches!(load_file(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"maxSendQueue": 0}}"#).unwrap();

        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = PairlinkSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("PAIRLINK_PORT", "5000"),
                ("PAIRLINK_PERSISTENCE", "off"),
                ("ONESIGNAL_APP_ID", "app"),
                ("ONESIGNAL_API_KEY", "key"),
                ("PAIRLINK_EMAIL_FROM", "alerts@example.com"),
                ("PAIRLINK_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.port, 5000);
        assert!(!settings.persistence.enabled);
        assert!(settings.push.is_configured());
        assert_eq!(settings.email.from.as_deref(), Some("alerts@example.com"));
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = PairlinkSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("PAIRLINK_PORT", "0"),
                ("PAIRLINK_PERSISTENCE", "maybe"),
                ("PAIRLINK_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 4000);
        assert!(settings.persistence.enabled);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("4000", 1, 65535), Some(4000));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u16_range("abc", 1, 65535), None);
    }
}
