//! Camera capability abstraction.
//!
//! The host supplies a [`CameraCapability`] that can list devices and
//! open a stream. Everything above this module only sees the traits,
//! which keeps real hardware, browser bridges and the synthetic test
//! camera interchangeable.

use super::FrameSample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// The user or platform refused access.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    /// No matching video input exists.
    #[error("no camera device found")]
    NoDeviceFound,
    /// The device cannot satisfy the request.
    #[error("camera does not support the requested constraints: {0}")]
    DeviceUnsupported(String),
    /// Negotiation did not finish in time.
    #[error("camera acquisition timed out after {0:?}")]
    Timeout(Duration),
    /// A live stream stopped delivering frames.
    #[error("camera stream interrupted: {0}")]
    StreamInterrupted(String),
    /// Any other platform failure.
    #[error("camera backend failure: {0}")]
    Backend(String),
}

/// Which way a camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// User-facing camera.
    Front,
    /// Environment-facing camera, the usual choice for scanning.
    #[default]
    Back,
    /// Facing could not be determined.
    Unknown,
}

impl Facing {
    /// Guesses the facing from a device label the way mobile browsers
    /// name their cameras.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if ["back", "rear", "environment", "traseira"]
            .iter()
            .any(|k| label.contains(k))
        {
            Facing::Back
        } else if ["front", "user", "facetime", "frontal"]
            .iter()
            .any(|k| label.contains(k))
        {
            Facing::Front
        } else {
            Facing::Unknown
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Facing::Front => "front",
            Facing::Back => "back",
            Facing::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A camera as reported by device enumeration. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    /// Stable device identifier.
    pub id: String,
    /// Human-readable label (may be empty before permission is granted).
    pub label: String,
    /// Physical orientation.
    pub facing: Facing,
}

impl CameraDevice {
    /// Creates a device entry.
    pub fn new(id: impl Into<String>, label: impl Into<String>, facing: Facing) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            facing,
        }
    }
}

/// Resolution and frame-rate hints for the first acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    /// Ideal frame width in pixels.
    pub width: u32,
    /// Ideal frame height in pixels.
    pub height: u32,
    /// Ideal frames per second.
    pub fps: u32,
}

/// One acquisition attempt. Unset fields mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireRequest {
    /// Specific device to open.
    pub device_id: Option<String>,
    /// Required facing mode.
    pub facing: Option<Facing>,
    /// Ideal capture format.
    pub ideal: Option<VideoConstraints>,
}

impl AcquireRequest {
    /// Request for any video device at all.
    pub fn any() -> Self {
        Self::default()
    }
}

/// Host capability for listing and opening cameras.
pub trait CameraCapability: Send + Sync {
    /// Lists the available video input devices.
    fn enumerate_devices(&self) -> Result<Vec<CameraDevice>, CameraError>;

    /// Opens a stream that satisfies `request`.
    ///
    /// May block while the platform negotiates the device; callers bound
    /// the wait themselves.
    fn acquire(&self, request: &AcquireRequest) -> Result<AcquiredStream, CameraError>;
}

/// A live frame stream handed out by a [`CameraCapability`].
pub trait StreamHandle: Send {
    /// Pulls the most recent frame. `Ok(None)` means no new frame is
    /// ready yet.
    fn pull_frame(&mut self) -> Result<Option<FrameSample>, CameraError>;

    /// Releases the underlying device. Called at most once, through
    /// [`LiveStream`].
    fn release(&mut self);
}

/// Result of a successful acquisition.
pub struct AcquiredStream {
    /// The stream itself.
    pub handle: Box<dyn StreamHandle>,
    /// Identifier of the device that was actually opened.
    pub device_id: String,
}

impl fmt::Debug for AcquiredStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquiredStream")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// Owning wrapper around an acquired stream.
///
/// Guarantees the device is released exactly once, either through
/// [`LiveStream::release`] or on drop.
pub struct LiveStream {
    handle: Box<dyn StreamHandle>,
    device_id: String,
    released: bool,
}

impl LiveStream {
    /// Wraps an acquired stream.
    pub fn new(acquired: AcquiredStream) -> Self {
        Self {
            handle: acquired.handle,
            device_id: acquired.device_id,
            released: false,
        }
    }

    /// Identifier of the opened device.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// True until [`release`](Self::release) has run.
    pub fn is_live(&self) -> bool {
        !self.released
    }

    /// Pulls a frame from the device.
    pub fn pull_frame(&mut self) -> Result<Option<FrameSample>, CameraError> {
        if self.released {
            return Err(CameraError::StreamInterrupted("stream already released".into()));
        }
        self.handle.pull_frame()
    }

    /// Releases the device. Safe to call any number of times.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.handle.release();
        tracing::debug!(device = %self.device_id, "Camera stream released");
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LiveStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveStream")
            .field("device_id", &self.device_id)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandle {
        releases: Arc<AtomicUsize>,
    }

    impl StreamHandle for CountingHandle {
        fn pull_frame(&mut self) -> Result<Option<FrameSample>, CameraError> {
            Ok(None)
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn live(releases: &Arc<AtomicUsize>) -> LiveStream {
        LiveStream::new(AcquiredStream {
            handle: Box::new(CountingHandle {
                releases: Arc::clone(releases),
            }),
            device_id: "cam-0".into(),
        })
    }

    #[test]
    fn test_release_is_idempotent() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut stream = live(&releases);

        stream.release();
        stream.release();
        drop(stream);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        drop(live(&releases));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pull_after_release_fails() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut stream = live(&releases);
        stream.release();

        assert!(matches!(
            stream.pull_frame(),
            Err(CameraError::StreamInterrupted(_))
        ));
    }

    #[test]
    fn test_facing_from_label() {
        assert_eq!(Facing::from_label("Back Camera"), Facing::Back);
        assert_eq!(Facing::from_label("camera2 1, facing environment"), Facing::Back);
        assert_eq!(Facing::from_label("FaceTime HD Camera"), Facing::Front);
        assert_eq!(Facing::from_label("USB Video Device"), Facing::Unknown);
    }
}
