//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::QrdeskSettings;

/// `~/.qrdesk`, falling back to `/tmp/.qrdesk` without `HOME`.
pub fn qrdesk_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".qrdesk")
}

/// Resolve the path to the settings file (`~/.qrdesk/settings.json`).
pub fn settings_path() -> PathBuf {
    qrdesk_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<QrdeskSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<QrdeskSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    clamp_to_limits(&mut settings);
    Ok(settings)
}

// ── Limits ──────────────────────────────────────────────────────────────────

pub const HEARTBEAT_SECS_RANGE: (u64, u64) = (1, 3600);
pub const QR_MODULE_SIZE_RANGE: (u32, u32) = (1, 100);
pub const QR_MAX_BORDER: u32 = 16;

/// Pull numeric settings into the ranges the server can run with. The
/// env layer already rejects out-of-range values; file values are clamped
/// here with a warning.
pub fn clamp_to_limits(settings: &mut QrdeskSettings) {
    let (lo, hi) = HEARTBEAT_SECS_RANGE;
    clamp_field("server.heartbeatIntervalSecs", &mut settings.server.heartbeat_interval_secs, lo, hi);
    clamp_field("server.maxSendQueue", &mut settings.server.max_send_queue, 1, usize::MAX);
    clamp_field("dispatch.queueCapacity", &mut settings.dispatch.queue_capacity, 1, usize::MAX);
    let (lo, hi) = QR_MODULE_SIZE_RANGE;
    clamp_field("qr.moduleSize", &mut settings.qr.module_size, lo, hi);
    clamp_field("qr.border", &mut settings.qr.border, 0, QR_MAX_BORDER);
}

fn clamp_field<T>(key: &str, value: &mut T, min: T, max: T)
where
    T: Copy + Ord + std::fmt::Display,
{
    let current = *value;
    let clamped = current.clamp(min, max);
    if clamped != current {
        tracing::warn!(key, value = %current, using = %clamped, "setting out of range, clamped");
        *value = clamped;
    }
}

fn load_file_layer(path: &Path) -> Result<QrdeskSettings> {
    let defaults = serde_json::to_value(QrdeskSettings::default())?;

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

/// Apply `QRDESK_*` environment overrides.
pub fn apply_env_overrides(settings: &mut QrdeskSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Integers must parse and fall inside their range, booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Anything else is
/// ignored with a warning.
pub fn apply_overrides_from<F>(settings: &mut QrdeskSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("QRDESK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("QRDESK_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("QRDESK_MAX_SEND_QUEUE", 1, 65_536) {
        settings.server.max_send_queue = v;
    }
    if let Some(v) = env.u64("QRDESK_HEARTBEAT_INTERVAL", 1, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }

    // ── Dispatch / QR ───────────────────────────────────────────────
    if let Some(v) = env.usize("QRDESK_DISPATCH_QUEUE", 1, 1_000_000) {
        settings.dispatch.queue_capacity = v;
    }
    if let Some(v) = env.u64("QRDESK_QR_MODULE_SIZE", 1, 100) {
        settings.qr.module_size = u32::try_from(v).unwrap_or(settings.qr.module_size);
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("QRDESK_DATABASE") {
        settings.storage.database_path = v;
    }
    if let Some(v) = env.string("QRDESK_UPLOAD_DIR") {
        settings.storage.upload_dir = v;
    }
    if let Some(v) = env.usize("QRDESK_MAX_UPLOAD_BYTES", 1024, 1_073_741_824) {
        settings.storage.max_upload_bytes = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("QRDESK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("QRDESK_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
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

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl FnOnce(&str) -> Option<T>, kind: &str) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, parse_bool, "bool")
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, |v| parse_u16_range(v, min, max), "u16")
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, |v| parse_u64_range(v, min, max), "u64")
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, |v| parse_usize_range(v, min, max), "usize")
    }
}
