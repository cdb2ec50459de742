//! Barcode decoding backends.
//!
//! A [`DecodeBackend`] turns one frame into at most one candidate. The
//! session tries its configured backends in order on every frame and is
//! otherwise unaware of how they work. The native backend is the
//! EAN-13 grammar in [`ean13`]; other symbologies come in through
//! [`ExternalBackend`].

mod backend;
pub mod ean13;

pub use backend::{Ean13Backend, ExternalBackend};
pub use ean13::Ean13Decoder;

use crate::capture::FrameSample;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Symbology of a decoded candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    /// EAN-13.
    Ean13,
    /// EAN-8.
    Ean8,
    /// UPC-A.
    UpcA,
    /// UPC-E.
    UpcE,
    /// Code 128.
    Code128,
    /// Code 39.
    Code39,
    /// Codabar.
    Codabar,
    /// Typed in by the operator.
    Manual,
    /// Reported by a backend without a recognised format.
    Unknown,
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BarcodeFormat::Ean13 => "EAN-13",
            BarcodeFormat::Ean8 => "EAN-8",
            BarcodeFormat::UpcA => "UPC-A",
            BarcodeFormat::UpcE => "UPC-E",
            BarcodeFormat::Code128 => "Code 128",
            BarcodeFormat::Code39 => "Code 39",
            BarcodeFormat::Codabar => "Codabar",
            BarcodeFormat::Manual => "manual",
            BarcodeFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Output of one decode attempt. May still be rejected by validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeCandidate {
    /// Decoded text.
    pub text: String,
    /// Symbology that produced it.
    pub format: BarcodeFormat,
    /// Backend-specific confidence in [0, 1], when reported.
    pub quality: Option<f32>,
}

impl BarcodeCandidate {
    /// Creates a candidate without a quality score.
    pub fn new(text: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            text: text.into(),
            format,
            quality: None,
        }
    }

    /// Attaches a quality score, clamped to [0, 1].
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Some(quality.clamp(0.0, 1.0));
        self
    }
}

/// Unexpected failure inside a decode backend.
///
/// Never fatal: the frame is treated as having no candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decoder `{backend}` failed: {message}")]
pub struct DecoderFault {
    /// Name of the failing backend.
    pub backend: String,
    /// What went wrong.
    pub message: String,
}

impl DecoderFault {
    /// Creates a fault report.
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// A strategy for finding a barcode in a frame.
pub trait DecodeBackend: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &str;

    /// Looks for one barcode in `frame`.
    fn decode(&self, frame: &FrameSample) -> Result<Option<BarcodeCandidate>, DecoderFault>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_clamped() {
        let candidate = BarcodeCandidate::new("123", BarcodeFormat::Code128).with_quality(1.7);
        assert_eq!(candidate.quality, Some(1.0));
    }

    #[test]
    fn test_fault_message() {
        let fault = DecoderFault::new("zxing", "bad luminance source");
        assert_eq!(fault.to_string(), "decoder `zxing` failed: bad luminance source");
    }
}
