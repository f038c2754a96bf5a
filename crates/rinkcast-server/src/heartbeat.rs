//! Ping/pong liveness for subscriber connections.
//!
//! Every session runs one heartbeat loop. Each tick queues a ping and
//! checks whether anything arrived from the subscriber since the previous
//! tick; enough silent ticks in a row and the subscriber is declared dead,
//! which closes the session. The silent-tick allowance is derived from the
//! configured timeout, so `heartbeat_timeout_secs` bounds how long a
//! vanished client can hold a connection slot.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::SubscriberConnection;

/// Why the heartbeat loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The subscriber went silent past the timeout window.
    Dead,
    /// The session ended first.
    Cancelled,
}

/// Drive pings for one connection until it dies or the session ends.
///
/// The connection's alive flag is set by the session reader on every
/// inbound frame (pongs included) and consumed here once per tick.
pub async fn run_heartbeat(
    connection: Arc<SubscriberConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatOutcome {
    let allowed_silent_ticks =
        u32::try_from((timeout.as_millis() / interval.as_millis().max(1)).max(1)).unwrap_or(1);
    let mut silent_ticks = 0u32;
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; it only primes the flag.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    silent_ticks = 0;
                } else {
                    silent_ticks += 1;
                    debug!(
                        subscriber = %connection.id,
                        silent_ticks,
                        allowed_silent_ticks,
                        "no traffic since last heartbeat tick"
                    );
                    if silent_ticks >= allowed_silent_ticks {
                        metrics::counter!("ws_heartbeat_timeouts_total").increment(1);
                        return HeartbeatOutcome::Dead;
                    }
                }
                connection.send_ping();
            }
            () = cancel.cancelled() => return HeartbeatOutcome::Cancelled,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
