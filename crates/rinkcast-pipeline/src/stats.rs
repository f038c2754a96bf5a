//! Live processing counters for one game run.
//!
//! Exposed through the health endpoint and mirrored into metrics. Cheap
//! atomics; no locks on the hot path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one game's pipeline run.
#[derive(Debug, Default)]
pub struct PipelineStats {
    snapshots_reduced: AtomicU64,
    outputs_emitted: AtomicU64,
    skips_emitted: AtomicU64,
    anomalies: AtomicU64,
    poison_snapshots: AtomicU64,
    audio_segments: AtomicU64,
}

/// Snapshot of the counters for serialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Snapshots successfully reduced.
    pub snapshots_reduced: u64,
    /// In-order outputs emitted.
    pub outputs_emitted: u64,
    /// Skip markers emitted.
    pub skips_emitted: u64,
    /// Reducer anomalies observed.
    pub anomalies: u64,
    /// Snapshots quarantined.
    pub poison_snapshots: u64,
    /// Audio segments rendered.
    pub audio_segments: u64,
}

impl PipelineStats {
    /// Fresh counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successful reduce with its anomaly count.
    pub fn record_reduce(&self, anomalies: usize) {
        let _ = self.snapshots_reduced.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .anomalies
            .fetch_add(anomalies as u64, Ordering::Relaxed);
        metrics::counter!("snapshots_reduced_total").increment(1);
        if anomalies > 0 {
            metrics::counter!("reduce_anomalies_total").increment(anomalies as u64);
        }
    }

    /// Count an emitted output and its audio segments.
    pub fn record_output(&self, audio_segments: usize) {
        let _ = self.outputs_emitted.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .audio_segments
            .fetch_add(audio_segments as u64, Ordering::Relaxed);
        metrics::counter!("outputs_emitted_total").increment(1);
    }

    /// Count an emitted skip marker.
    pub fn record_skip(&self) {
        let _ = self.skips_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a quarantined snapshot.
    pub fn record_poison(&self) {
        let _ = self.poison_snapshots.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("poison_snapshots_total").increment(1);
    }

    /// Read all counters at once.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            snapshots_reduced: self.snapshots_reduced.load(Ordering::Relaxed),
            outputs_emitted: self.outputs_emitted.load(Ordering::Relaxed),
            skips_emitted: self.skips_emitted.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            poison_snapshots: self.poison_snapshots.load(Ordering::Relaxed),
            audio_segments: self.audio_segments.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = PipelineStats::new();
        stats.record_reduce(0);
        stats.record_reduce(2);
        stats.record_output(3);
        stats.record_skip();
        stats.record_poison();

        let snap = stats.snapshot();
        assert_eq!(snap.snapshots_reduced, 2);
        assert_eq!(snap.anomalies, 2);
        assert_eq!(snap.outputs_emitted, 1);
        assert_eq!(snap.audio_segments, 3);
        assert_eq!(snap.skips_emitted, 1);
        assert_eq!(snap.poison_snapshots, 1);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = PipelineStats::new();
        stats.record_output(2);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["outputs_emitted"], 1);
        assert_eq!(json["audio_segments"], 2);
    }
}
