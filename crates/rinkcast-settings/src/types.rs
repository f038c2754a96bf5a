//! Settings schema with compiled defaults.
//!
//! Every field has a serde default so partial settings files merge cleanly
//! over the compiled configuration.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Pipeline timing, context, and stage-pool settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PipelineSettings {
    /// Game-time seconds between snapshot samples; governs skip timeouts.
    pub snapshot_cadence_seconds: u64,
    /// Soft token ceiling that triggers a session refresh.
    pub context_soft_tokens: u32,
    /// Hard token ceiling; prompts must never exceed this.
    pub context_hard_tokens: u32,
    /// Time-based refresh fallback: refresh after this many snapshots.
    pub refresh_every_n_snapshots: u32,
    /// Maximum snapshots in flight across the stage workers.
    pub stage_pool_size: usize,
    /// Ordering-queue skip window, as a multiple of the cadence.
    pub skip_after_multiplier: f64,
    /// Per-call timeout for the language collaborator, in ms.
    pub llm_timeout_ms: u64,
    /// Per-call timeout for the speech collaborator, in ms.
    pub tts_timeout_ms: u64,
    /// Per-call timeout for filesystem operations, in ms.
    pub fs_timeout_ms: u64,
    /// Momentum at or below this renders filler commentary.
    pub momentum_low_max: f64,
    /// Momentum at or above this renders play-by-play.
    pub momentum_high_min: f64,
    /// How many recent narration batches feed continuity context.
    pub recent_dialogue_window: usize,
    /// Watcher quiet period before declaring end of game, in seconds.
    pub end_of_game_quiet_secs: u64,
    /// Drain grace on session-wide cancel, in seconds.
    pub shutdown_grace_secs: u64,
    /// Audio container format. Fixed for v1.
    pub audio_format: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            snapshot_cadence_seconds: 5,
            context_soft_tokens: 30_000,
            context_hard_tokens: 48_000,
            refresh_every_n_snapshots: 15,
            stage_pool_size: 3,
            skip_after_multiplier: 2.0,
            llm_timeout_ms: 12_000,
            tts_timeout_ms: 8_000,
            fs_timeout_ms: 2_000,
            momentum_low_max: 0.35,
            momentum_high_min: 0.7,
            recent_dialogue_window: 5,
            end_of_game_quiet_secs: 30,
            shutdown_grace_secs: 10,
            audio_format: "wav_pcm16_24k_mono".into(),
        }
    }
}

impl PipelineSettings {
    /// The ordering-queue skip window in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn skip_after_ms(&self) -> u64 {
        (self.snapshot_cadence_seconds as f64 * self.skip_after_multiplier * 1000.0) as u64
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Broadcast server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket subscribers.
    pub max_connections: usize,
    /// Per-subscriber outbound queue depth; overflow disconnects.
    pub per_subscriber_queue: usize,
    /// Seconds between heartbeat pings to each subscriber.
    pub heartbeat_interval_secs: u64,
    /// Close a subscriber silent for this many seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            per_subscriber_queue: 64,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Broadcasters and storage
// ─────────────────────────────────────────────────────────────────────────────

/// Broadcaster persona names, surfaced in prompts and artifacts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BroadcasterSettings {
    /// Display name of speaker A (play-by-play).
    pub speaker_a_name: String,
    /// Display name of speaker B (color analyst).
    pub speaker_b_name: String,
    /// Narration language for the session.
    pub language: String,
}

impl Default for BroadcasterSettings {
    fn default() -> Self {
        Self {
            speaker_a_name: "Alex Chen".into(),
            speaker_b_name: "Mike Rodriguez".into(),
            language: "en-US".into(),
        }
    }
}

/// Artifact storage settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct StorageSettings {
    /// Root directory for per-game artifacts.
    pub root: String,
    /// Directory watched for incoming snapshots (per-game subdirectories).
    pub ingest_root: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: "data/games".into(),
            ingest_root: "data/live".into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Top level
// ─────────────────────────────────────────────────────────────────────────────

/// Complete Rinkcast settings tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RinkcastSettings {
    /// Pipeline settings.
    pub pipeline: PipelineSettings,
    /// Broadcast server settings.
    pub server: ServerSettings,
    /// Broadcaster personas.
    pub broadcasters: BroadcasterSettings,
    /// Storage layout.
    pub storage: StorageSettings,
    /// Minimum log level when `RUST_LOG` is unset.
    pub log_level: LogLevelSetting,
}

/// Log level wrapper so the default is `"info"` rather than empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogLevelSetting(pub String);

impl Default for LogLevelSetting {
    fn default() -> Self {
        Self("info".into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
