//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use rinkcast_pipeline::stats::StatsSnapshot;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket subscriber count.
    pub connections: usize,
    /// Live pipeline counters.
    pub pipeline: StatsSnapshot,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(
    start_time: Instant,
    connections: usize,
    pipeline: StatsSnapshot,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        pipeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rinkcast_pipeline::PipelineStats;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, PipelineStats::new().snapshot());
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0, PipelineStats::new().snapshot());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn counters_are_carried() {
        let stats = PipelineStats::new();
        stats.record_reduce(1);
        stats.record_output(2);
        let resp = health_check(Instant::now(), 5, stats.snapshot());
        assert_eq!(resp.connections, 5);
        assert_eq!(resp.pipeline.snapshots_reduced, 1);
        assert_eq!(resp.pipeline.audio_segments, 2);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["pipeline"]["outputs_emitted"], 1);
    }
}
