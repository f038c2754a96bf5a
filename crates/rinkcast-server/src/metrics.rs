//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Call once at
/// startup before any metrics are recorded; a second call (tests) falls
/// back to a detached recorder.
#[must_use]
pub fn install_recorder() -> PrometheusHandle {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("prometheus metrics recorder installed");
            handle
        }
        Err(_) => PrometheusBuilder::new().build_recorder().handle(),
    }
}

/// Render Prometheus text format from the installed recorder.
#[must_use]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Snapshots reduced (counter).
pub const SNAPSHOTS_REDUCED_TOTAL: &str = "snapshots_reduced_total";
/// Reducer anomalies observed (counter).
pub const REDUCE_ANOMALIES_TOTAL: &str = "reduce_anomalies_total";
/// Quarantined snapshots (counter).
pub const POISON_SNAPSHOTS_TOTAL: &str = "poison_snapshots_total";
/// In-order outputs emitted (counter).
pub const OUTPUTS_EMITTED_TOTAL: &str = "outputs_emitted_total";
/// Out-of-order completions buffered (counter).
pub const ORDERING_PENDING_WAITS_TOTAL: &str = "ordering_pending_waits_total";
/// Skip markers emitted (counter).
pub const ORDERING_SKIPS_TOTAL: &str = "ordering_skips_total";
/// Session refreshes (counter, labels: stage, trigger).
pub const SESSION_REFRESHES_TOTAL: &str = "session_refreshes_total";
/// Collaborator retries (counter, labels: op, category).
pub const COLLABORATOR_RETRIES_TOTAL: &str = "collaborator_retries_total";
/// Collaborator call duration (histogram, labels: op).
pub const COLLABORATOR_CALL_DURATION_SECONDS: &str = "collaborator_call_duration_seconds";
/// Stage degradations (counter, labels: stage).
pub const STAGE_DEGRADED_TOTAL: &str = "stage_degraded_total";
/// Roster-lock rewrites (counter).
pub const NARRATE_ROSTER_REWRITES_TOTAL: &str = "narrate_roster_rewrites_total";
/// Segments dropped by post-filters (counter, labels: reason).
pub const NARRATE_SEGMENTS_DROPPED_TOTAL: &str = "narrate_segments_dropped_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Subscriber queue overflows (counter).
pub const WS_SUBSCRIBER_OVERFLOWS_TOTAL: &str = "ws_subscriber_overflows_total";
/// Subscribers closed for missing heartbeats (counter).
pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "ws_heartbeat_timeouts_total";
