//! Camera acquisition and sampling configuration.

use super::{Facing, VideoConstraints};
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for camera acquisition.
///
/// The ideal format is only a hint for the first attempt of the
/// constraint-relaxation ladder; later attempts drop it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device to open first. `None` lets the facing preference decide.
    pub device_id: Option<String>,
    /// Preferred facing mode.
    pub facing: Facing,
    /// Ideal frame width in pixels.
    pub ideal_width: u32,
    /// Ideal frame height in pixels.
    pub ideal_height: u32,
    /// Ideal frames per second from the device.
    pub ideal_fps: u32,
    /// Upper bound on each acquisition attempt, in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            facing: Facing::Back,
            ideal_width: 1280,
            ideal_height: 720,
            ideal_fps: 30,
            acquire_timeout_ms: 10_000,
        }
    }
}

impl CameraConfig {
    /// Ideal capture format for the first ladder step.
    pub fn ideal(&self) -> VideoConstraints {
        VideoConstraints {
            width: self.ideal_width,
            height: self.ideal_height,
            fps: self.ideal_fps,
        }
    }

    /// Bound on a single acquisition attempt.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ideal_width == 0 || self.ideal_height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.ideal_fps == 0 || self.ideal_fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if !(1_000..=60_000).contains(&self.acquire_timeout_ms) {
            return Err(ConfigError::InvalidTimeout(self.acquire_timeout_ms));
        }
        Ok(())
    }
}

/// Configuration for the frame sampling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Frames analysed per second.
    pub fps: u32,
    /// Skip frames whose content is identical to the previous one.
    pub skip_duplicate_frames: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            skip_duplicate_frames: true,
        }
    }
}

impl SamplerConfig {
    /// Time between two frame pulls.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.fps.max(1)))
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 || self.fps > 30 {
            return Err(ConfigError::InvalidSampleRate(self.fps));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(CameraConfig::default().validate().is_ok());
        assert!(SamplerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let config = CameraConfig {
            ideal_width: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_timeout_bounds() {
        let config = CameraConfig {
            acquire_timeout_ms: 120_000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(120_000))
        ));
    }

    #[test]
    fn test_sampler_rate_bounds() {
        let config = SamplerConfig {
            fps: 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(SamplerConfig::default().interval(), Duration::from_millis(100));
    }
}
