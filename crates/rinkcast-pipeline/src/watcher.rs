//! Snapshot watcher.
//!
//! Polls the per-game ingest directory and emits one [`SnapshotArrival`]
//! per new snapshot file, in chronological order within each poll. A file
//! is not emitted until its size has been stable across consecutive polls,
//! so half-written files never enter the pipeline. Delivery is
//! at-least-once; downstream dedup absorbs duplicates.
//!
//! Filename parse failures are warnings, not stream errors. Filesystem
//! errors are retried with backoff; persistent failure closes the stream.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rinkcast_core::{GameId, GameTime};

/// One detected snapshot file, ready to read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotArrival {
    /// Coordinate parsed from the filename.
    pub game_time: GameTime,
    /// Absolute path to the stable file.
    pub path: PathBuf,
    /// When the watcher first saw the file.
    pub wall_time: DateTime<Utc>,
}

/// Watcher tuning.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// Directory poll interval.
    pub poll_interval: Duration,
    /// A file is stable after its size is unchanged across this many polls.
    pub stability_polls: u32,
    /// Give up on files that never stabilize within this window.
    pub max_stability_wait: Duration,
    /// Consecutive read-dir failures tolerated before the stream closes.
    pub max_fs_failures: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            stability_polls: 1,
            max_stability_wait: Duration::from_secs(30),
            max_fs_failures: 5,
        }
    }
}

struct PendingFile {
    size: u64,
    stable_polls: u32,
    first_seen: Instant,
    wall_time: DateTime<Utc>,
}

/// Start watching a directory for one game's snapshots.
///
/// Returns the arrival stream. The stream ends when `cancel` fires or the
/// filesystem fails persistently. It is not restartable; a new watch
/// starts from current directory contents.
#[must_use]
pub fn watch(
    dir: PathBuf,
    game_id: GameId,
    config: WatcherConfig,
    cancel: CancellationToken,
) -> mpsc::Receiver<SnapshotArrival> {
    let (tx, rx) = mpsc::channel(64);
    let _task = tokio::spawn(watch_loop(dir, game_id, config, cancel, tx));
    rx
}

async fn watch_loop(
    dir: PathBuf,
    game_id: GameId,
    config: WatcherConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<SnapshotArrival>,
) {
    let mut emitted: HashSet<PathBuf> = HashSet::new();
    let mut warned: HashSet<PathBuf> = HashSet::new();
    let mut pending: HashMap<PathBuf, PendingFile> = HashMap::new();
    let mut fs_failures = 0u32;

    info!(?dir, game_id = %game_id, "watching ingest directory");

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(game_id = %game_id, "watcher cancelled");
                return;
            }
            () = tokio::time::sleep(config.poll_interval) => {}
        }

        let entries = match scan_dir(&dir).await {
            Ok(entries) => {
                fs_failures = 0;
                entries
            }
            Err(err) => {
                fs_failures += 1;
                warn!(?dir, error = %err, fs_failures, "ingest directory scan failed");
                if fs_failures >= config.max_fs_failures {
                    error!(?dir, "ingest directory unreadable, closing snapshot stream");
                    return;
                }
                // Exponential backoff on top of the poll interval.
                let backoff = config.poll_interval * 2u32.saturating_pow(fs_failures.min(5));
                tokio::time::sleep(backoff).await;
                continue;
            }
        };

        let mut ready: Vec<SnapshotArrival> = Vec::new();

        for (path, size) in entries {
            if emitted.contains(&path) {
                continue;
            }
            let (file_game_id, game_time) = match GameTime::parse_file_stem(&path) {
                Ok(parsed) => parsed,
                Err(err) => {
                    if warned.insert(path.clone()) {
                        warn!(?path, error = %err, "unparseable snapshot filename, skipping");
                    }
                    continue;
                }
            };
            if file_game_id != game_id.as_str() {
                continue;
            }

            // A file is ready only once its size has held still across
            // consecutive polls; the first sighting just records it.
            let entry = match pending.entry(path.clone()) {
                std::collections::hash_map::Entry::Vacant(vacant) => vacant.insert(PendingFile {
                    size,
                    stable_polls: 0,
                    first_seen: Instant::now(),
                    wall_time: Utc::now(),
                }),
                std::collections::hash_map::Entry::Occupied(occupied) => {
                    let entry = occupied.into_mut();
                    if entry.size == size {
                        entry.stable_polls += 1;
                    } else {
                        entry.size = size;
                        entry.stable_polls = 0;
                    }
                    entry
                }
            };

            if entry.stable_polls >= config.stability_polls {
                ready.push(SnapshotArrival {
                    game_time,
                    path: path.clone(),
                    wall_time: entry.wall_time,
                });
            } else if entry.first_seen.elapsed() > config.max_stability_wait {
                warn!(?path, "snapshot file never stabilized, skipping");
                let _ = emitted.insert(path.clone());
                let _ = pending.remove(&path);
            }
        }

        // Emit this poll's stable files in game-time order.
        ready.sort_by_key(|a| a.game_time);
        for arrival in ready {
            let _ = pending.remove(&arrival.path);
            let _ = emitted.insert(arrival.path.clone());
            debug!(path = ?arrival.path, game_time = %arrival.game_time, "snapshot arrival");
            if tx.send(arrival).await.is_err() {
                return; // consumer gone
            }
        }
    }
}

/// List regular files in the directory with their sizes.
async fn scan_dir(dir: &PathBuf) -> std::io::Result<Vec<(PathBuf, u64)>> {
    let mut out = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if meta.is_file() {
            out.push((entry.path(), meta.len()));
        }
    }
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
