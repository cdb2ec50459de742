//! Scan-line luminance extraction and thresholding.

use super::BinarySignal;
use crate::capture::{FrameSample, PixelFormat};
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Settings for turning a frame into a [`BinarySignal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Luma below this value is a bar.
    pub threshold: u8,
    /// Left edge of the sampled window, as a fraction of width.
    pub window_start: f32,
    /// Right edge of the sampled window, as a fraction of width.
    pub window_end: f32,
    /// Rows to try, as fractions of height. The first is the primary line.
    pub scan_lines: Vec<f32>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            threshold: 160,
            window_start: 0.10,
            window_end: 0.90,
            scan_lines: vec![0.5, 0.35, 0.65],
        }
    }
}

impl ExtractorConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold == 0 || self.threshold == u8::MAX {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if !(0.0..1.0).contains(&self.window_start)
            || !(0.0..=1.0).contains(&self.window_end)
            || self.window_start >= self.window_end
        {
            return Err(ConfigError::InvalidWindow);
        }
        if self.scan_lines.is_empty() || self.scan_lines.iter().any(|l| !(0.0..=1.0).contains(l)) {
            return Err(ConfigError::InvalidScanLines);
        }
        Ok(())
    }
}

/// Perceptual luma (ITU-R BT.601 weights) in integer arithmetic.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000) as u8
}

/// Converts frames into binarized scan-line signals.
///
/// Pure: the same frame always yields the same signal.
#[derive(Debug, Clone, Default)]
pub struct SignalExtractor {
    config: ExtractorConfig,
}

impl SignalExtractor {
    /// Creates an extractor with the given settings.
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Returns the settings.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts the signal along the vertical center of the frame.
    pub fn extract(&self, frame: &FrameSample) -> BinarySignal {
        self.extract_row(frame, frame.height() / 2)
    }

    /// Extracts one signal per configured scan line, primary line first.
    pub fn extract_lines(&self, frame: &FrameSample) -> Vec<BinarySignal> {
        let last_row = frame.height().saturating_sub(1);
        let mut rows: Vec<u32> = Vec::with_capacity(self.config.scan_lines.len());
        for fraction in &self.config.scan_lines {
            let row = ((frame.height() as f32 * fraction) as u32).min(last_row);
            if !rows.contains(&row) {
                rows.push(row);
            }
        }
        rows.into_iter().map(|row| self.extract_row(frame, row)).collect()
    }

    /// Extracts the signal along row `y`, restricted to the configured
    /// horizontal window. Out-of-range rows give an empty signal.
    pub fn extract_row(&self, frame: &FrameSample, y: u32) -> BinarySignal {
        let Some(row) = frame.row(y) else {
            return BinarySignal::default();
        };
        let width = frame.width() as usize;
        let edge = |fraction: f32| (width as f64 * f64::from(fraction)).round() as usize;
        let start = edge(self.config.window_start);
        let end = edge(self.config.window_end).min(width);
        if start >= end {
            return BinarySignal::default();
        }

        let bpp = frame.format().bytes_per_pixel();
        let threshold = self.config.threshold;
        BinarySignal::from_bits((start..end).map(|x| {
            let px = &row[x * bpp..(x + 1) * bpp];
            let y = match frame.format() {
                PixelFormat::Gray8 => px[0],
                PixelFormat::Rgb8 | PixelFormat::Rgba8 => luma(px[0], px[1], px[2]),
            };
            u8::from(y < threshold)
        }))
    }
}
