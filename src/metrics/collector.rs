//! Metrics collection and registry.

use crate::session::{ScanState, SessionStats};
use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

const STATES: [ScanState; 6] = [
    ScanState::Idle,
    ScanState::Initializing,
    ScanState::Scanning,
    ScanState::Detected,
    ScanState::Error,
    ScanState::Closed,
];

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Current lifecycle state.
    pub state: ScanState,
    /// Frames returned by the camera.
    pub frames_sampled: u64,
    /// Frames skipped as empty or duplicate.
    pub frames_skipped: u64,
    /// Candidates evaluated by the validator.
    pub candidates_evaluated: u64,
    /// Candidates refused by the validator.
    pub candidates_rejected: u64,
    /// Detections suppressed by the cooldown.
    pub detections_debounced: u64,
    /// Backend failures, including caught panics.
    pub decoder_faults: u64,
    /// Codes delivered to the caller.
    pub results: u64,
    /// Of those, codes entered manually.
    pub manual_results: u64,
    /// Successful camera acquisitions.
    pub camera_acquisitions: u64,
    /// Unix time of the last accepted code.
    pub last_accepted_unix: Option<i64>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            state: ScanState::Idle,
            frames_sampled: 0,
            frames_skipped: 0,
            candidates_evaluated: 0,
            candidates_rejected: 0,
            detections_debounced: 0,
            decoder_faults: 0,
            results: 0,
            manual_results: 0,
            camera_acquisitions: 0,
            last_accepted_unix: None,
        }
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from session counters.
    pub fn from_stats(stats: &SessionStats) -> Self {
        Self {
            state: stats.state,
            frames_sampled: stats.frames_sampled,
            frames_skipped: stats.frames_skipped,
            candidates_evaluated: stats.scan_count,
            candidates_rejected: stats.rejected,
            detections_debounced: stats.debounced,
            decoder_faults: stats.decoder_faults,
            results: stats.results,
            manual_results: stats.manual_results,
            camera_acquisitions: stats.acquisitions,
            last_accepted_unix: stats.last_accepted.as_ref().map(|a| a.at.timestamp()),
        }
    }
}

/// Prometheus metrics registry for scan sessions.
pub struct MetricsRegistry {
    registry: Registry,

    session_state: IntGaugeVec,
    last_accepted: IntGauge,

    // Frame pipeline
    frames_sampled: IntCounter,
    frames_skipped: IntCounter,
    decoder_faults: IntCounter,

    // Candidates
    candidates_evaluated: IntCounter,
    candidates_rejected: IntCounter,
    detections_debounced: IntCounter,
    results: IntCounter,
    manual_results: IntCounter,

    camera_acquisitions: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_state = IntGaugeVec::new(
            Opts::new(
                "optical_barcode_session_state",
                "Current scan session state (1 for the active state)",
            ),
            &["state"],
        )?;
        let last_accepted = IntGauge::new(
            "optical_barcode_last_accepted_timestamp_seconds",
            "Unix time of the last accepted code",
        )?;

        let frames_sampled = IntCounter::new(
            "optical_barcode_frames_sampled_total",
            "Frames pulled from the camera",
        )?;
        let frames_skipped = IntCounter::new(
            "optical_barcode_frames_skipped_total",
            "Frames skipped as empty or identical to the previous frame",
        )?;
        let decoder_faults = IntCounter::new(
            "optical_barcode_decoder_faults_total",
            "Decode backend failures",
        )?;

        let candidates_evaluated = IntCounter::new(
            "optical_barcode_candidates_evaluated_total",
            "Candidates passed to the validator",
        )?;
        let candidates_rejected = IntCounter::new(
            "optical_barcode_candidates_rejected_total",
            "Candidates refused by the validator",
        )?;
        let detections_debounced = IntCounter::new(
            "optical_barcode_detections_debounced_total",
            "Repeat detections suppressed within the cooldown",
        )?;
        let results = IntCounter::new(
            "optical_barcode_results_total",
            "Codes delivered to the caller",
        )?;
        let manual_results = IntCounter::new(
            "optical_barcode_manual_results_total",
            "Codes entered manually",
        )?;

        let camera_acquisitions = IntCounter::new(
            "optical_barcode_camera_acquisitions_total",
            "Successful camera acquisitions",
        )?;

        registry.register(Box::new(session_state.clone()))?;
        registry.register(Box::new(last_accepted.clone()))?;
        registry.register(Box::new(frames_sampled.clone()))?;
        registry.register(Box::new(frames_skipped.clone()))?;
        registry.register(Box::new(decoder_faults.clone()))?;
        registry.register(Box::new(candidates_evaluated.clone()))?;
        registry.register(Box::new(candidates_rejected.clone()))?;
        registry.register(Box::new(detections_debounced.clone()))?;
        registry.register(Box::new(results.clone()))?;
        registry.register(Box::new(manual_results.clone()))?;
        registry.register(Box::new(camera_acquisitions.clone()))?;

        for state in STATES {
            session_state.with_label_values(&[state.as_str()]).set(0);
        }
        session_state
            .with_label_values(&[ScanState::Idle.as_str()])
            .set(1);

        Ok(Self {
            registry,
            session_state,
            last_accepted,
            frames_sampled,
            frames_skipped,
            decoder_faults,
            candidates_evaluated,
            candidates_rejected,
            detections_debounced,
            results,
            manual_results,
            camera_acquisitions,
        })
    }

    /// Updates all metrics from a snapshot of session state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        for state in STATES {
            let active = i64::from(state == snapshot.state);
            self.session_state
                .with_label_values(&[state.as_str()])
                .set(active);
        }
        if let Some(at) = snapshot.last_accepted_unix {
            self.last_accepted.set(at);
        }

        // Counters only move forward; advance each by the difference.
        advance(&self.frames_sampled, snapshot.frames_sampled);
        advance(&self.frames_skipped, snapshot.frames_skipped);
        advance(&self.decoder_faults, snapshot.decoder_faults);
        advance(&self.candidates_evaluated, snapshot.candidates_evaluated);
        advance(&self.candidates_rejected, snapshot.candidates_rejected);
        advance(&self.detections_debounced, snapshot.detections_debounced);
        advance(&self.results, snapshot.results);
        advance(&self.manual_results, snapshot.manual_results);
        advance(&self.camera_acquisitions, snapshot.camera_acquisitions);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            state: ScanState::Scanning,
            frames_sampled: 40,
            frames_skipped: 3,
            candidates_evaluated: 5,
            candidates_rejected: 1,
            detections_debounced: 2,
            results: 2,
            manual_results: 1,
            camera_acquisitions: 1,
            last_accepted_unix: Some(1_700_000_000),
            ..Default::default()
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("optical_barcode_session_state{state=\"scanning\"} 1"));
        assert!(output.contains("optical_barcode_session_state{state=\"idle\"} 0"));
        assert!(output.contains("optical_barcode_frames_sampled_total 40"));
        assert!(output.contains("optical_barcode_results_total 2"));
        assert!(output.contains("optical_barcode_last_accepted_timestamp_seconds 1700000000"));
    }

    #[test]
    fn test_counters_never_go_back() {
        let registry = MetricsRegistry::new().unwrap();

        registry.update(&MetricsSnapshot {
            results: 4,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            results: 1,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("optical_barcode_results_total 4"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("optical_barcode_session_state"));
        assert!(output.contains("optical_barcode_decoder_faults_total"));
        assert!(output.contains("optical_barcode_camera_acquisitions_total"));
    }
}
