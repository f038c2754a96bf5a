//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RinkcastSettings;

/// Load settings from a path, with env var overrides applied on top.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RinkcastSettings> {
    let defaults = serde_json::to_value(RinkcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RinkcastSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
#[must_use]
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

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules; invalid values are silently
/// ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut RinkcastSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("RINKCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("RINKCAST_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("RINKCAST_MAX_CONNECTIONS", 1, 10_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read_env_usize("RINKCAST_SUBSCRIBER_QUEUE", 1, 65_536) {
        settings.server.per_subscriber_queue = v;
    }

    // ── Pipeline ────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("RINKCAST_CADENCE_SECS", 1, 3600) {
        settings.pipeline.snapshot_cadence_seconds = v;
    }
    if let Some(v) = read_env_usize("RINKCAST_STAGE_POOL", 1, 64) {
        settings.pipeline.stage_pool_size = v;
    }
    if let Some(v) = read_env_u32("RINKCAST_REFRESH_EVERY", 1, 1000) {
        settings.pipeline.refresh_every_n_snapshots = v;
    }
    if let Some(v) = read_env_u32("RINKCAST_SOFT_TOKENS", 1000, 1_000_000) {
        settings.pipeline.context_soft_tokens = v;
    }
    if let Some(v) = read_env_u64("RINKCAST_LLM_TIMEOUT_MS", 100, 600_000) {
        settings.pipeline.llm_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("RINKCAST_TTS_TIMEOUT_MS", 100, 600_000) {
        settings.pipeline.tts_timeout_ms = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("RINKCAST_DATA_ROOT") {
        settings.storage.root = v;
    }
    if let Some(v) = read_env_string("RINKCAST_INGEST_ROOT") {
        settings.storage.ingest_root = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("RINKCAST_LOG_LEVEL") {
        settings.log_level.0 = v;
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    std::env::var(name)
        .ok()?
        .parse::<u16>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    std::env::var(name)
        .ok()?
        .parse::<u32>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    std::env::var(name)
        .ok()?
        .parse::<usize>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
