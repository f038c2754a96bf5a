//! The broadcast hub: ordered fan-out to subscribers.
//!
//! The hub serializes each frame once, then `try_send`s the shared string
//! to every interested subscriber. Backpressure never reaches the
//! pipeline: a subscriber whose bounded queue overflows is disconnected on
//! the spot while everyone else keeps receiving.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use rinkcast_core::{GameId, GameTime, SubscriberId};
use rinkcast_pipeline::OutputEvent;

use crate::connection::SubscriberConnection;
use crate::protocol::{self, ServerMessage};

/// Manages frame broadcasting to connected subscribers.
pub struct BroadcastHub {
    connections: RwLock<HashMap<SubscriberId, Arc<SubscriberConnection>>>,
}

impl BroadcastHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<SubscriberConnection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
        metrics::gauge!("ws_connections_active").set(conns.len() as f64);
    }

    /// Remove a connection by ID.
    pub async fn remove(&self, id: &SubscriberId) {
        let mut conns = self.connections.write().await;
        let _ = conns.remove(id);
        metrics::gauge!("ws_connections_active").set(conns.len() as f64);
    }

    /// Number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Publish one ordered pipeline event to every interested subscriber.
    pub async fn publish(&self, event: &OutputEvent) {
        let (game_id, game_time, frames) = match event {
            OutputEvent::Output(output) => (
                output.game_id.clone(),
                Some(output.game_time),
                protocol::frames_for_output(output),
            ),
            OutputEvent::Skip {
                game_id,
                game_time,
                reason,
            } => (
                game_id.clone(),
                Some(*game_time),
                vec![ServerMessage::Skip {
                    game_id: game_id.clone(),
                    game_time: *game_time,
                    reason: reason.clone(),
                }],
            ),
            OutputEvent::End { game_id } => (
                game_id.clone(),
                None,
                vec![ServerMessage::End {
                    game_id: game_id.clone(),
                }],
            ),
        };
        self.publish_frames(&game_id, game_time, &frames).await;
    }

    /// Serialize frames once and fan them out.
    async fn publish_frames(
        &self,
        game_id: &GameId,
        game_time: Option<GameTime>,
        frames: &[ServerMessage],
    ) {
        let serialized: Vec<Arc<String>> = frames
            .iter()
            .filter_map(|frame| match serde_json::to_string(frame) {
                Ok(json) => Some(Arc::new(json)),
                Err(err) => {
                    warn!(error = %err, "failed to serialize broadcast frame");
                    None
                }
            })
            .collect();
        if serialized.is_empty() {
            return;
        }

        let mut evicted = Vec::new();
        {
            let conns = self.connections.read().await;
            let recipients = conns
                .values()
                .filter(|c| c.wants(game_id, game_time))
                .count();
            debug!(
                game_id = %game_id,
                frames = serialized.len(),
                recipients,
                "broadcasting event"
            );

            for conn in conns.values() {
                if !conn.wants(game_id, game_time) {
                    continue;
                }
                for frame in &serialized {
                    if !conn.send(frame.clone()) {
                        warn!(
                            subscriber = %conn.id,
                            dropped = conn.drop_count(),
                            "subscriber queue overflowed, disconnecting"
                        );
                        metrics::counter!("ws_subscriber_overflows_total").increment(1);
                        evicted.push(conn.id.clone());
                        break;
                    }
                }
            }
        }

        for id in evicted {
            self.remove(&id).await;
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Pump ordered pipeline events into the hub until the stream ends.
///
/// The hub never blocks on a subscriber, so this keeps pace with the
/// ordering queue regardless of client behavior.
pub async fn pump_outputs(hub: Arc<BroadcastHub>, mut outputs: mpsc::Receiver<OutputEvent>) {
    while let Some(event) = outputs.recv().await {
        let is_end = matches!(event, OutputEvent::End { .. });
        hub.publish(&event).await;
        if is_end {
            info!("game stream ended, broadcast pump stopping");
            return;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
