//! Configuration file format and validation errors.

use crate::capture::{CameraConfig, SamplerConfig};
use crate::extraction::ExtractorConfig;
use crate::session::SessionConfig;
use crate::validation::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Ideal width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Ideal camera frame rate out of range.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Acquire timeout out of range.
    #[error("invalid acquire timeout {0} ms (must be 1000-60000)")]
    InvalidTimeout(u64),
    /// Sampler rate out of range.
    #[error("invalid sample rate {0} fps (must be 1-30)")]
    InvalidSampleRate(u32),
    /// Luma threshold out of range.
    #[error("invalid luma threshold {0} (must be 1-254)")]
    InvalidThreshold(u8),
    /// Horizontal scan window is empty or outside the frame.
    #[error("invalid scan window (need 0 <= start < end <= 1)")]
    InvalidWindow,
    /// No scan lines, or one outside the frame.
    #[error("invalid scan lines (need at least one, each within 0..=1)")]
    InvalidScanLines,
    /// Debounce cooldown too long.
    #[error("invalid cooldown {0} ms (must be at most 60000)")]
    InvalidCooldown(u64),
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Camera selection and acquisition.
    #[serde(default)]
    pub camera: CameraConfig,
    /// Frame sampling cadence.
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Scan line extraction.
    #[serde(default)]
    pub extractor: ExtractorConfig,
    /// Candidate acceptance rules.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Session behavior after a detection.
    #[serde(default)]
    pub session: SessionConfig,
    /// Metrics output.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { metrics_port: 9090 }
    }
}

impl FileConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.validate()?;
        self.sampler.validate()?;
        self.extractor.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Facing;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = FileConfig::from_toml("").unwrap();
        assert_eq!(config.sampler.fps, 10);
        assert_eq!(config.extractor.threshold, 160);
        assert_eq!(config.session.cooldown_ms, 1500);
        assert_eq!(config.output.metrics_port, 9090);
    }

    #[test]
    fn test_partial_sections() {
        let config = FileConfig::from_toml(
            r#"
            [camera]
            facing = "front"
            acquire_timeout_ms = 5000

            [session]
            continuous = true

            [validation]
            strict_short_codes = true
            "#,
        )
        .unwrap();

        assert_eq!(config.camera.facing, Facing::Front);
        assert_eq!(config.camera.acquire_timeout_ms, 5000);
        assert_eq!(config.camera.ideal_width, 1280);
        assert!(config.session.continuous);
        assert!(config.validation.strict_short_codes);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert_eq!(
            FileConfig::from_toml("[extractor]\nthreshold = 0").unwrap_err(),
            ConfigError::InvalidThreshold(0)
        );
        assert_eq!(
            FileConfig::from_toml("[session]\ncooldown_ms = 90000").unwrap_err(),
            ConfigError::InvalidCooldown(90_000)
        );
        assert!(matches!(
            FileConfig::from_toml("[sampler]\nfps = \"fast\""),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            FileConfig::from_file("/nonexistent/optical-barcode.toml"),
            Err(ConfigError::FileReadError(_))
        ));
    }
}
