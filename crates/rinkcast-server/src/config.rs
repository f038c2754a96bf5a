//! Server configuration.

use serde::{Deserialize, Serialize};

use rinkcast_settings::ServerSettings;

/// Configuration for the broadcast server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket subscribers.
    pub max_connections: usize,
    /// Per-subscriber outbound queue depth; overflow disconnects.
    pub per_subscriber_queue: usize,
    /// Seconds between heartbeat pings (see the `heartbeat` module).
    pub heartbeat_interval_secs: u64,
    /// Close a subscriber silent for this many seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            per_subscriber_queue: settings.per_subscriber_queue,
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.heartbeat_timeout_secs,
            max_message_size: settings.max_message_size,
        }
    }
}
