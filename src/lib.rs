//! Optical Barcode Library
//!
//! Real-time barcode acquisition from live camera frames. Negotiates
//! camera access through a host-provided capability, samples frames at a
//! bounded rate, decodes EAN-13 natively (other symbologies through
//! pluggable backends), validates and debounces candidates, and hands
//! accepted codes to the caller.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → extraction → decoding → validation → session callback
//!    ↑                                               │
//!    └────────────── session (lifecycle) ────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **One camera at a time**: a session never holds two live streams
//! - **Release on every exit path**: detection, close, switch, failure, drop
//! - **Never throws from the frame loop**: backend faults are counted, not raised
//! - **Manual entry is first class**: it goes through the same validator
//!
//! # Example
//!
//! ```no_run
//! use optical_barcode::{ScanOptions, ScanSession, SyntheticCamera};
//! use std::sync::Arc;
//! use std::sync::mpsc;
//!
//! let camera = Arc::new(SyntheticCamera::new());
//! camera.show("4006381333931");
//!
//! let session = ScanSession::new(camera).unwrap();
//! let (tx, rx) = mpsc::channel();
//! let tx = std::sync::Mutex::new(tx);
//! session
//!     .open(ScanOptions::new(move |result| {
//!         let _ = tx.lock().map(|tx| tx.send(result.code.clone()));
//!     }))
//!     .unwrap();
//!
//! let code = rx.recv().unwrap();
//! assert_eq!(code, "4006381333931");
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod decoding;
pub mod extraction;
pub mod metrics;
pub mod session;
pub mod validation;

mod sync;

// Re-export commonly used types at crate root
pub use capture::{CameraCapability, CameraDevice, CameraError, Facing, FrameSample, SyntheticCamera};
pub use config::{ConfigError, FileConfig};
pub use decoding::{BarcodeCandidate, BarcodeFormat, DecodeBackend, Ean13Decoder};
pub use extraction::{BinarySignal, SignalExtractor};
pub use session::{ScanError, ScanErrorKind, ScanOptions, ScanResult, ScanSession, ScanState};
pub use validation::{CandidateValidator, DebounceGate, Rejection};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
