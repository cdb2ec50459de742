//! Session-level error taxonomy.

use super::{InvalidTransition, ScanState};
use crate::capture::CameraError;
use crate::config::ConfigError;
use crate::decoding::DecoderFault;
use crate::validation::Rejection;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a [`ScanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanErrorKind {
    /// Camera access refused.
    PermissionDenied,
    /// No camera present.
    NoDeviceFound,
    /// No camera satisfied even the relaxed request.
    DeviceUnsupported,
    /// Camera negotiation timed out.
    AcquisitionTimeout,
    /// Live stream lost mid-session.
    StreamInterrupted,
    /// Code failed validation.
    InvalidCandidate,
    /// A decode backend failed.
    DecoderFault,
    /// Operation not allowed in the current state.
    InvalidState,
    /// Switch requested with a single camera.
    NoAlternateCamera,
    /// Acquisition superseded by close or another request.
    Cancelled,
    /// Invalid configuration.
    Config,
}

impl ScanErrorKind {
    /// True for failures the operator can act on (grant permission,
    /// plug in a camera, retry), which the UI should show together with
    /// the manual-entry fallback.
    pub fn is_user_actionable(self) -> bool {
        matches!(
            self,
            ScanErrorKind::PermissionDenied
                | ScanErrorKind::NoDeviceFound
                | ScanErrorKind::DeviceUnsupported
                | ScanErrorKind::AcquisitionTimeout
        )
    }
}

/// Errors surfaced by a scan session.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// Camera access refused.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// No camera present.
    #[error("no camera device found")]
    NoDeviceFound,

    /// No camera satisfied even the relaxed request.
    #[error("camera not supported: {0}")]
    DeviceUnsupported(String),

    /// Camera negotiation timed out on every step.
    #[error("camera did not respond within {0:?}")]
    AcquisitionTimeout(Duration),

    /// Live stream lost mid-session.
    #[error("camera stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Code failed validation.
    #[error("invalid barcode: {0}")]
    InvalidCandidate(#[from] Rejection),

    /// A decode backend failed.
    #[error(transparent)]
    DecoderFault(#[from] DecoderFault),

    /// Operation not allowed in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// State the session was in.
        state: ScanState,
    },

    /// Switch requested with a single camera.
    #[error("no other camera to switch to")]
    NoAlternateCamera,

    /// Acquisition superseded by close or another request.
    #[error("scan session was closed before the camera was ready")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ScanError {
    /// Classification of this error.
    pub fn kind(&self) -> ScanErrorKind {
        match self {
            ScanError::PermissionDenied(_) => ScanErrorKind::PermissionDenied,
            ScanError::NoDeviceFound => ScanErrorKind::NoDeviceFound,
            ScanError::DeviceUnsupported(_) => ScanErrorKind::DeviceUnsupported,
            ScanError::AcquisitionTimeout(_) => ScanErrorKind::AcquisitionTimeout,
            ScanError::StreamInterrupted(_) => ScanErrorKind::StreamInterrupted,
            ScanError::InvalidCandidate(_) => ScanErrorKind::InvalidCandidate,
            ScanError::DecoderFault(_) => ScanErrorKind::DecoderFault,
            ScanError::InvalidState { .. } => ScanErrorKind::InvalidState,
            ScanError::NoAlternateCamera => ScanErrorKind::NoAlternateCamera,
            ScanError::Cancelled => ScanErrorKind::Cancelled,
            ScanError::Config(_) => ScanErrorKind::Config,
        }
    }
}

impl From<InvalidTransition> for ScanError {
    fn from(e: InvalidTransition) -> Self {
        ScanError::InvalidState {
            operation: e.event.verb(),
            state: e.from,
        }
    }
}

impl From<CameraError> for ScanError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::PermissionDenied(reason) => ScanError::PermissionDenied(reason),
            CameraError::NoDeviceFound => ScanError::NoDeviceFound,
            CameraError::DeviceUnsupported(reason) => ScanError::DeviceUnsupported(reason),
            CameraError::Timeout(after) => ScanError::AcquisitionTimeout(after),
            CameraError::StreamInterrupted(reason) => ScanError::StreamInterrupted(reason),
            CameraError::Backend(reason) => ScanError::DeviceUnsupported(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable_kinds() {
        assert!(ScanError::NoDeviceFound.kind().is_user_actionable());
        assert!(ScanError::from(CameraError::Timeout(Duration::from_secs(10)))
            .kind()
            .is_user_actionable());
        assert!(!ScanError::StreamInterrupted("unplugged".into())
            .kind()
            .is_user_actionable());
        assert!(!ScanError::from(Rejection::Empty).kind().is_user_actionable());
    }

    #[test]
    fn test_camera_error_mapping() {
        assert!(matches!(
            ScanError::from(CameraError::PermissionDenied("NotAllowedError".into())),
            ScanError::PermissionDenied(_)
        ));
        assert_eq!(
            ScanError::from(CameraError::Backend("v4l2".into())).kind(),
            ScanErrorKind::DeviceUnsupported
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let error = ScanError::InvalidState {
            operation: "open",
            state: ScanState::Closed,
        };
        assert_eq!(error.to_string(), "cannot open while closed");

        let rejected = ScanState::Idle.next(crate::session::SessionEvent::Retry).unwrap_err();
        assert_eq!(ScanError::from(rejected).to_string(), "cannot retry while idle");
    }
}
