//! Durable artifacts and crash recovery.
//!
//! Per-game layout under the storage root:
//!
//! ```text
//! <root>/<game_id>/
//!   static.json
//!   board/latest.json
//!   board/history/<game_time>.json
//!   analyze/<game_time>.json
//!   narrate/<game_time>.json
//!   audio/<game_time>/<nn>_<speaker>_<emotion>.wav
//!   audio/<game_time>/manifest.json
//!   quarantine/<original_name>
//!   watermark.json
//! ```
//!
//! Every write goes through temp-file + atomic rename, so readers only ever
//! see a consistent latest or a prior version. Recovery loads the static
//! context, the latest board, and the watermark; artifacts for coordinates
//! past the watermark are partial by definition and are discarded.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use rinkcast_agents::Analysis;
use rinkcast_core::{AudioSegment, GameId, GameTime, NarrationBatch, StaticContext};

/// Persistence errors. All of them classify as resource exhaustion for the
/// failure policy: the pipeline cannot run without its artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O failed at {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Artifact serialization failure.
    #[error("artifact encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Watermark file payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Watermark {
    emitted: GameTime,
}

/// Audio manifest entry, one per rendered segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioManifestEntry {
    /// Segment file name within the game-time directory.
    pub file: String,
    /// Speaker label.
    pub speaker: String,
    /// Emotion label.
    pub emotion: String,
    /// Rendered duration in seconds.
    pub duration_seconds: f32,
}

/// State recovered at startup.
#[derive(Debug)]
pub struct RecoveredState {
    /// The persisted static context.
    pub static_context: StaticContext,
    /// Latest board state bytes, if any reduce ever succeeded.
    pub board_bytes: Option<Vec<u8>>,
    /// Last emitted coordinate, if anything was ever emitted.
    pub watermark: Option<GameTime>,
}

/// Artifact store for one game.
#[derive(Clone, Debug)]
pub struct GameStore {
    dir: PathBuf,
    fs_timeout: std::time::Duration,
}

impl GameStore {
    /// Create a store rooted at `<root>/<game_id>/`.
    #[must_use]
    pub fn new(root: &Path, game_id: &GameId) -> Self {
        Self {
            dir: root.join(game_id.as_str()),
            fs_timeout: std::time::Duration::from_millis(2_000),
        }
    }

    /// Override the per-write filesystem deadline.
    #[must_use]
    pub fn with_fs_timeout(mut self, fs_timeout: std::time::Duration) -> Self {
        self.fs_timeout = fs_timeout;
        self
    }

    /// The game's artifact directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist the static context.
    pub async fn write_static(&self, ctx: &StaticContext) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(ctx)?;
        self.write_atomic(&self.dir.join("static.json"), &bytes).await
    }

    /// Persist board state: `board/latest.json` plus a history entry.
    pub async fn write_board(&self, bytes: &[u8], game_time: GameTime) -> Result<(), StoreError> {
        self.write_atomic(&self.dir.join("board").join("latest.json"), bytes)
            .await?;
        self.write_atomic(
            &self
                .dir
                .join("board")
                .join("history")
                .join(format!("{game_time}.json")),
            bytes,
        )
        .await
    }

    /// Persist the Analyze output for a coordinate.
    pub async fn write_analysis(
        &self,
        game_time: GameTime,
        analysis: &Analysis,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(analysis)?;
        self.write_atomic(
            &self.dir.join("analyze").join(format!("{game_time}.json")),
            &bytes,
        )
        .await
    }

    /// Persist the narration batch for a coordinate.
    pub async fn write_narration(
        &self,
        game_time: GameTime,
        batch: &NarrationBatch,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(batch)?;
        self.write_atomic(
            &self.dir.join("narrate").join(format!("{game_time}.json")),
            &bytes,
        )
        .await
    }

    /// Persist rendered audio segments plus their manifest.
    pub async fn write_audio(
        &self,
        game_time: GameTime,
        segments: &[AudioSegment],
    ) -> Result<(), StoreError> {
        let audio_dir = self.dir.join("audio").join(game_time.to_string());
        let mut manifest = Vec::with_capacity(segments.len());

        for segment in segments {
            let file = format!(
                "{:02}_{}_{}.wav",
                segment.index, segment.speaker, segment.emotion
            );
            self.write_atomic(&audio_dir.join(&file), &segment.wav).await?;
            manifest.push(AudioManifestEntry {
                file,
                speaker: segment.speaker.to_string(),
                emotion: segment.emotion.to_string(),
                duration_seconds: segment.duration_seconds,
            });
        }

        let bytes = serde_json::to_vec_pretty(&manifest)?;
        self.write_atomic(&audio_dir.join("manifest.json"), &bytes).await
    }

    /// Persist the emitted watermark.
    pub async fn write_watermark(&self, game_time: GameTime) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&Watermark { emitted: game_time })?;
        self.write_atomic(&self.dir.join("watermark.json"), &bytes).await
    }

    /// Move a poison snapshot file into quarantine.
    pub async fn quarantine(&self, path: &Path) -> Result<(), StoreError> {
        let name = path
            .file_name()
            .map_or_else(|| "unnamed".into(), |n| n.to_string_lossy().into_owned());
        let target = self.dir.join("quarantine").join(name);
        self.ensure_parent(&target).await?;
        match tokio::fs::rename(path, &target).await {
            Ok(()) => {
                warn!(?path, ?target, "snapshot quarantined");
                Ok(())
            }
            // Ingest and storage may sit on different filesystems, where
            // rename fails: copy then remove.
            Err(_) => {
                tokio::fs::copy(path, &target)
                    .await
                    .map_err(|source| StoreError::Io {
                        path: target.clone(),
                        source,
                    })?;
                let _ = tokio::fs::remove_file(path).await;
                warn!(?path, ?target, "snapshot quarantined (copied)");
                Ok(())
            }
        }
    }

    /// Load recovery state: static context, latest board, watermark.
    ///
    /// Returns `None` when no static context was ever persisted (fresh
    /// game). Partial artifacts past the watermark are removed.
    pub async fn load_recovery(&self) -> Result<Option<RecoveredState>, StoreError> {
        let static_path = self.dir.join("static.json");
        let Ok(static_bytes) = tokio::fs::read(&static_path).await else {
            return Ok(None);
        };
        let static_context: StaticContext = serde_json::from_slice(&static_bytes)?;

        let board_bytes = tokio::fs::read(self.dir.join("board").join("latest.json"))
            .await
            .ok();

        let watermark = match tokio::fs::read(self.dir.join("watermark.json")).await {
            Ok(bytes) => Some(serde_json::from_slice::<Watermark>(&bytes)?.emitted),
            Err(_) => None,
        };

        self.discard_partials(watermark).await;

        info!(
            game_dir = ?self.dir,
            ?watermark,
            has_board = board_bytes.is_some(),
            "recovered persisted state"
        );
        Ok(Some(RecoveredState {
            static_context,
            board_bytes,
            watermark,
        }))
    }

    /// Remove stage artifacts for coordinates past the watermark; they were
    /// in flight at the crash and will be regenerated from their snapshots.
    async fn discard_partials(&self, watermark: Option<GameTime>) {
        for sub in ["analyze", "narrate", "audio"] {
            let dir = self.dir.join(sub);
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let keep = parse_artifact_stem(&entry.path())
                    .is_some_and(|t| watermark.is_some_and(|w| t <= w));
                if !keep {
                    debug!(path = ?entry.path(), "discarding partial artifact");
                    let path = entry.path();
                    if path.is_dir() {
                        let _ = tokio::fs::remove_dir_all(&path).await;
                    } else {
                        let _ = tokio::fs::remove_file(&path).await;
                    }
                }
            }
        }
    }

    /// Write bytes via temp file + atomic rename, under the fs deadline.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        self.ensure_parent(path).await?;
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::now_v7()));
        let write_then_rename = async {
            tokio::fs::write(&tmp, bytes)
                .await
                .map_err(|source| StoreError::Io {
                    path: tmp.clone(),
                    source,
                })?;
            tokio::fs::rename(&tmp, path)
                .await
                .map_err(|source| StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
        };
        match tokio::time::timeout(self.fs_timeout, write_then_rename).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "fs deadline exceeded"),
            }),
        }
    }

    async fn ensure_parent(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Parse a `<game_time>.json` stem or `<game_time>` directory name.
fn parse_artifact_stem(path: &Path) -> Option<GameTime> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts = stem.splitn(3, '_');
    let period: u32 = parts.next()?.parse().ok()?;
    let minute: u8 = parts.next()?.parse().ok()?;
    let second: u8 = parts.next()?.parse().ok()?;
    Some(GameTime::new(period, minute, second))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
