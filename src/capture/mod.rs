//! Camera input and frame handling.
//!
//! This module negotiates access to a camera through a host-provided
//! capability, bounds every acquisition attempt, and pulls frames at a
//! fixed cadence on a single sampling thread per stream.

mod camera;
mod config;
mod frame;
#[cfg(feature = "camera")]
mod native;
mod sampler;
mod source;
mod synthetic;

pub use camera::{
    AcquireRequest, AcquiredStream, CameraCapability, CameraDevice, CameraError, Facing,
    LiveStream, StreamHandle, VideoConstraints,
};
pub use config::{CameraConfig, SamplerConfig};
pub use frame::{FrameSample, PixelFormat};
#[cfg(feature = "camera")]
pub use native::NativeCamera;
pub use sampler::{ActiveStream, FrameSampler, LoopControl, SampledEvent, SamplerStats};
pub use source::{CameraSource, LadderStep};
pub use synthetic::{AcquireScript, SyntheticCamera};
