//! Prometheus metrics exporter for scan sessions.
//!
//! # Metrics Exposed
//!
//! ## Session
//! - `optical_barcode_session_state{state}` - 1 for the current state, 0 otherwise
//! - `optical_barcode_last_accepted_timestamp_seconds` - Unix time of the last accepted code
//! - `optical_barcode_camera_acquisitions_total` - Successful camera acquisitions
//!
//! ## Frames
//! - `optical_barcode_frames_sampled_total` - Frames pulled from the camera
//! - `optical_barcode_frames_skipped_total` - Empty or duplicate frames
//! - `optical_barcode_decoder_faults_total` - Backend failures
//!
//! ## Candidates
//! - `optical_barcode_candidates_evaluated_total` - Candidates validated (camera and manual)
//! - `optical_barcode_candidates_rejected_total` - Candidates refused by the validator
//! - `optical_barcode_detections_debounced_total` - Repeats suppressed by the cooldown
//! - `optical_barcode_results_total` - Codes delivered to the caller
//! - `optical_barcode_manual_results_total` - Codes entered manually
//!
//! # Example
//!
//! ```no_run
//! use optical_barcode::capture::SyntheticCamera;
//! use optical_barcode::metrics::{MetricsRegistry, MetricsSnapshot};
//! use optical_barcode::session::ScanSession;
//! use std::sync::Arc;
//!
//! let session = ScanSession::new(Arc::new(SyntheticCamera::new())).unwrap();
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! registry.update(&MetricsSnapshot::from_stats(&session.stats()));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
