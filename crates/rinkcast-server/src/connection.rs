//! Per-subscriber connection state.
//!
//! Each subscriber owns a bounded outbound queue. `try_send` keeps the hub
//! non-blocking: a full queue marks the subscriber overflowed, and the hub
//! disconnects it rather than ever stalling the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use rinkcast_core::{GameId, GameTime, SubscriberId};

/// Items the writer task forwards to the socket.
#[derive(Clone, Debug)]
pub enum Outbound {
    /// A serialized protocol frame, shared across subscribers.
    Frame(Arc<String>),
    /// A heartbeat ping.
    Ping,
}

/// One connected subscriber.
pub struct SubscriberConnection {
    /// Unique connection ID.
    pub id: SubscriberId,
    /// Game bound by a subscribe request.
    game_id: Mutex<Option<GameId>>,
    /// Resume-from coordinate, when requested.
    since: Mutex<Option<GameTime>>,
    /// Bounded send queue to the writer task.
    tx: mpsc::Sender<Outbound>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the subscriber responded since the last heartbeat check.
    is_alive: AtomicBool,
    /// Set once the outbound queue overflowed.
    overflowed: AtomicBool,
    /// Frames dropped on the floor due to a full queue.
    dropped_frames: AtomicU64,
}

impl SubscriberConnection {
    /// Create a connection around its send queue.
    #[must_use]
    pub fn new(id: SubscriberId, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            game_id: Mutex::new(None),
            since: Mutex::new(None),
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            overflowed: AtomicBool::new(false),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Bind this connection to a game stream.
    pub fn subscribe(&self, game_id: GameId, since: Option<GameTime>) {
        *self.game_id.lock() = Some(game_id);
        *self.since.lock() = since;
    }

    /// Whether this connection wants events for `game_id` at `game_time`.
    #[must_use]
    pub fn wants(&self, game_id: &GameId, game_time: Option<GameTime>) -> bool {
        if self.game_id.lock().as_ref() != Some(game_id) {
            return false;
        }
        match (game_time, *self.since.lock()) {
            (Some(t), Some(since)) => t > since,
            _ => true,
        }
    }

    /// Queue a frame without blocking.
    ///
    /// Returns `false` once the queue is full or closed; the connection is
    /// then marked overflowed and the hub evicts it.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(Outbound::Frame(frame)).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            self.overflowed.store(true, Ordering::Relaxed);
            false
        }
    }

    /// Queue a heartbeat ping (best-effort).
    pub fn send_ping(&self) {
        let _ = self.tx.try_send(Outbound::Ping);
    }

    /// Whether the outbound queue has overflowed.
    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Frames dropped for this connection.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
