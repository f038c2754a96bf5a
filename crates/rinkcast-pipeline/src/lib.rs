//! # rinkcast-pipeline
//!
//! The real-time ingest → reduce → narrate → synthesize pipeline.
//!
//! - [`watcher`]: observes the per-game ingest directory and emits
//!   stable, chronologically ordered snapshot arrivals
//! - [`ordering`]: buffers out-of-order stage completions and releases
//!   them in strict game-time order with a bounded-wait skip rule
//! - [`persistence`]: durable artifacts, watermark, and crash recovery
//! - [`orchestrator`]: wires the reducer actor, the stage worker pool,
//!   and the ordering queue together for one game
//! - [`stats`]: live processing counters for health and metrics

#![deny(unsafe_code)]

pub mod orchestrator;
pub mod ordering;
pub mod persistence;
pub mod stats;
pub mod watcher;

pub use ordering::{OrderingQueue, OutputEvent};
pub use orchestrator::{run_game, GameRun, GameRunConfig};
pub use persistence::{GameStore, RecoveredState};
pub use stats::PipelineStats;
pub use watcher::{watch, SnapshotArrival, WatcherConfig};
