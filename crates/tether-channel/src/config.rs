//! Channel configuration.
//!
//! Loading flow:
//! 1. Start with compiled [`ChannelConfig::default()`]
//! 2. If `~/.tether/settings.json` exists, deep-merge user values over
//!    defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use tether_core::backoff::ReconnectPolicy;

/// Configuration for a [`crate::SessionChannel`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket endpoint of the backend.
    pub endpoint: String,
    /// Shared credential presented during the handshake.
    pub credential: String,
    /// Interval between client `ping` frames in seconds.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which the socket is considered dead.
    pub heartbeat_timeout_secs: u64,
    /// Poll interval of the suspension drain loop in milliseconds.
    pub drain_poll_ms: u64,
    /// Reconnection backoff parameters.
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8080".into(),
            credential: String::new(),
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            drain_poll_ms: 250,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Resolve the path to the settings file (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Load configuration from the default path with env var overrides.
pub fn load_config() -> Result<ChannelConfig, serde_json::Error> {
    load_config_from_path(&settings_path())
}

/// Load configuration from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_config_from_path(path: &Path) -> Result<ChannelConfig, serde_json::Error> {
    let defaults = serde_json::to_value(ChannelConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading channel settings from file");
        let content = std::fs::read_to_string(path).unwrap_or_default();
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut config: ChannelConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment variable overrides to a loaded configuration.
///
/// Invalid values are silently ignored (fall back to file/default).
pub fn apply_env_overrides(config: &mut ChannelConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

/// Override application with an injectable variable lookup.
fn apply_overrides_from(
    config: &mut ChannelConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("TETHER_ENDPOINT") {
        if !v.is_empty() {
            config.endpoint = v;
        }
    }
    if let Some(v) = lookup("TETHER_CREDENTIAL") {
        config.credential = v;
    }
    if let Some(v) = read_u64(&lookup, "TETHER_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        config.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_u64(&lookup, "TETHER_HEARTBEAT_TIMEOUT_SECS", 1, 3600) {
        config.heartbeat_timeout_secs = v;
    }
    if let Some(v) = read_u64(&lookup, "TETHER_DRAIN_POLL_MS", 10, 60_000) {
        config.drain_poll_ms = v;
    }
}

fn read_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    lookup(name)?
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
