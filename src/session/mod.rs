//! Scan session orchestration.
//!
//! A [`ScanSession`] owns the camera for its lifetime, drives the
//! sampling loop, runs decode backends on each frame, and hands accepted
//! codes to the caller's result callback. All lifecycle changes go
//! through [`ScanState::next`].

mod engine;
mod error;
mod state;
mod tone;

pub use engine::{ScanSession, ScanSessionBuilder};
pub use error::{ScanError, ScanErrorKind};
pub use state::{InvalidTransition, ScanState, SessionEvent};
pub use tone::{ConfirmationTone, SilentSink, ToneError, ToneSink};

use crate::capture::{CameraDevice, Facing};
use crate::config::ConfigError;
use crate::decoding::BarcodeFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Session behaviour defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Window during which a repeat of the last code is ignored.
    pub cooldown_ms: u64,
    /// Keep scanning after a detection instead of finishing.
    pub continuous: bool,
    /// Play the confirmation tone on each accepted code.
    pub tone: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1500,
            continuous: false,
            tone: true,
        }
    }
}

impl SessionConfig {
    /// Debounce cooldown.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cooldown_ms > 60_000 {
            return Err(ConfigError::InvalidCooldown(self.cooldown_ms));
        }
        Ok(())
    }
}

/// Callback receiving accepted codes.
pub type ResultCallback = Arc<dyn Fn(&ScanResult) + Send + Sync>;

/// Callback receiving session failures.
pub type ErrorCallback = Arc<dyn Fn(&ScanError) + Send + Sync>;

/// Per-open settings and callbacks.
///
/// Callbacks run on the sampling thread (or on the caller's thread for
/// manual entry and acquisition failures) and must not block for long.
#[derive(Clone)]
pub struct ScanOptions {
    /// Camera facing to try first.
    pub preferred_facing: Facing,
    /// Debounce cooldown.
    pub cooldown: Duration,
    /// Keep scanning after each detection.
    pub continuous: bool,
    on_result: ResultCallback,
    on_error: Option<ErrorCallback>,
}

impl ScanOptions {
    /// Single-shot scanning on the back camera with a 1.5 s cooldown.
    pub fn new<F>(on_result: F) -> Self
    where
        F: Fn(&ScanResult) + Send + Sync + 'static,
    {
        Self {
            preferred_facing: Facing::Back,
            cooldown: Duration::from_millis(1500),
            continuous: false,
            on_result: Arc::new(on_result),
            on_error: None,
        }
    }

    /// Options taken from configuration.
    pub fn from_config<F>(config: &SessionConfig, facing: Facing, on_result: F) -> Self
    where
        F: Fn(&ScanResult) + Send + Sync + 'static,
    {
        Self::new(on_result)
            .facing(facing)
            .cooldown(config.cooldown())
            .continuous(config.continuous)
    }

    /// Sets the preferred facing.
    pub fn facing(mut self, facing: Facing) -> Self {
        self.preferred_facing = facing;
        self
    }

    /// Sets the debounce cooldown.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Enables or disables continuous scanning.
    pub fn continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Sets the error callback.
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&ScanError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub(crate) fn result_callback(&self) -> &ResultCallback {
        &self.on_result
    }

    pub(crate) fn error_callback(&self) -> Option<&ErrorCallback> {
        self.on_error.as_ref()
    }
}

impl fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("preferred_facing", &self.preferred_facing)
            .field("cooldown", &self.cooldown)
            .field("continuous", &self.continuous)
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// Where an accepted code came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultSource {
    /// Decoded from a frame by the named backend.
    Camera { backend: String },
    /// Typed in by the operator.
    Manual,
}

/// A code accepted by the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    /// Validated code.
    pub code: String,
    /// Symbology it was read as.
    pub format: BarcodeFormat,
    /// Camera or manual entry.
    pub source: ResultSource,
    /// When it was accepted.
    pub accepted_at: DateTime<Utc>,
}

/// The last accepted code and its timestamp, always updated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedCode {
    /// The accepted code.
    pub code: String,
    /// When it was accepted.
    pub at: DateTime<Utc>,
}

/// Point-in-time counters for a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Lifecycle state.
    pub state: ScanState,
    /// Camera in use, if one has been acquired.
    pub device: Option<CameraDevice>,
    /// Frames returned by the camera.
    pub frames_sampled: u64,
    /// Frames dropped before analysis.
    pub frames_skipped: u64,
    /// Candidates evaluated by the validator, camera and manual.
    pub scan_count: u64,
    /// Candidates refused by the validator.
    pub rejected: u64,
    /// Detections suppressed by the cooldown.
    pub debounced: u64,
    /// Backend failures, including caught panics.
    pub decoder_faults: u64,
    /// Accepted codes, camera and manual.
    pub results: u64,
    /// Of those, codes entered manually.
    pub manual_results: u64,
    /// Successful camera acquisitions.
    pub acquisitions: u64,
    /// Last accepted code.
    pub last_accepted: Option<AcceptedCode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_bounds() {
        assert!(SessionConfig::default().validate().is_ok());
        let config = SessionConfig {
            cooldown_ms: 61_000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidCooldown(61_000)));
    }

    #[test]
    fn test_options_from_config() {
        let config = SessionConfig {
            cooldown_ms: 500,
            continuous: true,
            tone: false,
        };
        let options = ScanOptions::from_config(&config, Facing::Front, |_| {});

        assert_eq!(options.preferred_facing, Facing::Front);
        assert_eq!(options.cooldown, Duration::from_millis(500));
        assert!(options.continuous);
        assert!(options.error_callback().is_none());
    }
}
