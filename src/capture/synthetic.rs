//! In-process camera that renders barcodes into noisy frames.
//!
//! Used by the demo binary and the test suite. Frames are generated,
//! not captured, so the noise here says nothing about real optics.

use super::{
    AcquireRequest, AcquiredStream, CameraCapability, CameraDevice, CameraError, Facing,
    FrameSample, PixelFormat, StreamHandle,
};
use crate::decoding::ean13;
use crate::sync::lock;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PAPER: i32 = 225;
const INK: i32 = 35;

/// Scripted outcome for the next acquisition attempt.
#[derive(Debug, Clone)]
pub enum AcquireScript {
    /// Fail with this error.
    Fail(CameraError),
    /// Succeed normally.
    Succeed,
}

#[derive(Default)]
struct Shared {
    scene: Mutex<Option<String>>,
    interrupted: AtomicBool,
    live: AtomicUsize,
    max_live: AtomicUsize,
    acquisitions: AtomicU64,
}

/// Synthetic [`CameraCapability`] with fault injection.
pub struct SyntheticCamera {
    devices: Vec<CameraDevice>,
    width: u32,
    height: u32,
    module_px: u32,
    noise: i32,
    seed: u64,
    acquire_delay: Duration,
    interrupt_after: Option<u64>,
    script: Mutex<VecDeque<AcquireScript>>,
    requests: Mutex<Vec<AcquireRequest>>,
    shared: Arc<Shared>,
}

impl SyntheticCamera {
    /// A back and a front camera rendering 320x240 RGBA frames.
    pub fn new() -> Self {
        Self::with_devices(vec![
            CameraDevice::new("synthetic-back", "Synthetic Back Camera", Facing::Back),
            CameraDevice::new("synthetic-front", "Synthetic Front Camera", Facing::Front),
        ])
    }

    /// Uses the given device list.
    pub fn with_devices(devices: Vec<CameraDevice>) -> Self {
        Self {
            devices,
            width: 320,
            height: 240,
            module_px: 2,
            noise: 24,
            seed: 0x5eed,
            acquire_delay: Duration::ZERO,
            interrupt_after: None,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Queues outcomes for the next acquisition attempts.
    pub fn with_script(self, script: Vec<AcquireScript>) -> Self {
        *lock(&self.script) = script.into();
        self
    }

    /// Delays every acquisition.
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Makes each stream fail after `frames` pulls.
    pub fn with_interrupt_after(mut self, frames: u64) -> Self {
        self.interrupt_after = Some(frames);
        self
    }

    /// Sets frame size and module width in pixels.
    pub fn with_geometry(mut self, width: u32, height: u32, module_px: u32) -> Self {
        self.width = width;
        self.height = height;
        self.module_px = module_px.max(1);
        self
    }

    /// Sets the per-pixel noise amplitude (0 disables noise).
    pub fn with_noise(mut self, amplitude: i32, seed: u64) -> Self {
        self.noise = amplitude.max(0);
        self.seed = seed;
        self
    }

    /// Puts a code in front of the camera.
    pub fn show(&self, code: &str) {
        *lock(&self.shared.scene) = Some(code.to_owned());
    }

    /// Removes whatever is in front of the camera.
    pub fn clear(&self) {
        *lock(&self.shared.scene) = None;
    }

    /// Simulates the device being unplugged: live streams fail on their
    /// next pull.
    pub fn unplug(&self) {
        self.shared.interrupted.store(true, Ordering::SeqCst);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<AcquireRequest> {
        lock(&self.requests).clone()
    }

    /// Streams currently acquired and not yet released.
    pub fn live_streams(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live streams observed.
    pub fn max_live_streams(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }

    /// Successful acquisitions so far.
    pub fn acquisitions(&self) -> u64 {
        self.shared.acquisitions.load(Ordering::SeqCst)
    }

    fn resolve(&self, request: &AcquireRequest) -> Result<&CameraDevice, CameraError> {
        if let Some(id) = &request.device_id {
            return self
                .devices
                .iter()
                .find(|d| &d.id == id)
                .ok_or(CameraError::NoDeviceFound);
        }
        match request.facing {
            Some(facing) => self
                .devices
                .iter()
                .find(|d| d.facing == facing)
                .ok_or_else(|| CameraError::DeviceUnsupported(format!("no {facing} camera"))),
            None => self.devices.first().ok_or(CameraError::NoDeviceFound),
        }
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraCapability for SyntheticCamera {
    fn enumerate_devices(&self) -> Result<Vec<CameraDevice>, CameraError> {
        Ok(self.devices.clone())
    }

    fn acquire(&self, request: &AcquireRequest) -> Result<AcquiredStream, CameraError> {
        lock(&self.requests).push(request.clone());
        if !self.acquire_delay.is_zero() {
            std::thread::sleep(self.acquire_delay);
        }
        if let Some(AcquireScript::Fail(e)) = lock(&self.script).pop_front() {
            return Err(e);
        }
        let device = self.resolve(request)?;

        let index = self.shared.acquisitions.fetch_add(1, Ordering::SeqCst);
        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);
        self.shared.interrupted.store(false, Ordering::SeqCst);

        tracing::debug!(device = %device.id, "Synthetic camera acquired");
        Ok(AcquiredStream {
            handle: Box::new(SyntheticStream {
                width: self.width,
                height: self.height,
                module_px: self.module_px,
                noise: self.noise,
                rng: ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(index)),
                interrupt_after: self.interrupt_after,
                sequence: 0,
                shared: Arc::clone(&self.shared),
            }),
            device_id: device.id.clone(),
        })
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    module_px: u32,
    noise: i32,
    rng: ChaCha8Rng,
    interrupt_after: Option<u64>,
    sequence: u64,
    shared: Arc<Shared>,
}

impl SyntheticStream {
    /// Paper/ink level for each column of the frame.
    fn columns(&self) -> Vec<i32> {
        let mut columns = vec![PAPER; self.width as usize];
        let scene = lock(&self.shared.scene).clone();
        let Some(modules) = scene.as_deref().and_then(ean13::encode) else {
            return columns;
        };
        let span = modules.len() * self.module_px as usize;
        let start = (self.width as usize).saturating_sub(span) / 2;
        for (i, &bit) in modules.iter().enumerate() {
            if bit == 0 {
                continue;
            }
            for px in 0..self.module_px as usize {
                if let Some(c) = columns.get_mut(start + i * self.module_px as usize + px) {
                    *c = INK;
                }
            }
        }
        columns
    }

    fn jitter(&mut self) -> i32 {
        if self.noise == 0 {
            return 0;
        }
        let span = (2 * self.noise + 1) as u32;
        (self.rng.next_u32() % span) as i32 - self.noise
    }
}

impl StreamHandle for SyntheticStream {
    fn pull_frame(&mut self) -> Result<Option<FrameSample>, CameraError> {
        if self.shared.interrupted.load(Ordering::SeqCst) {
            return Err(CameraError::StreamInterrupted("device unplugged".into()));
        }
        if self.interrupt_after.is_some_and(|limit| self.sequence >= limit) {
            return Err(CameraError::StreamInterrupted("track ended".into()));
        }
        self.sequence += 1;

        let columns = self.columns();
        let (top, bottom) = (self.height / 5, self.height - self.height / 5);
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for &column in &columns {
                let base = if (top..bottom).contains(&y) { column } else { PAPER };
                let level = (base + self.jitter()).clamp(0, 255) as u8;
                pixels.extend_from_slice(&[level, level, level, 255]);
            }
        }

        Ok(Some(FrameSample::new(
            pixels,
            self.width,
            self.height,
            PixelFormat::Rgba8,
            self.sequence,
        )))
    }

    fn release(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::LiveStream;

    #[test]
    fn test_acquire_by_facing() {
        let camera = SyntheticCamera::new();
        let request = AcquireRequest {
            facing: Some(Facing::Front),
            ..Default::default()
        };

        let stream = camera.acquire(&request).unwrap();
        assert_eq!(stream.device_id, "synthetic-front");
        assert_eq!(camera.live_streams(), 1);

        drop(LiveStream::new(stream));
        assert_eq!(camera.live_streams(), 0);
    }

    #[test]
    fn test_unknown_device_id() {
        let camera = SyntheticCamera::new();
        let request = AcquireRequest {
            device_id: Some("missing".into()),
            ..Default::default()
        };
        assert!(matches!(
            camera.acquire(&request),
            Err(CameraError::NoDeviceFound)
        ));
    }

    #[test]
    fn test_frames_are_valid_rgba() {
        let camera = SyntheticCamera::new();
        camera.show("4006381333931");
        let mut stream = LiveStream::new(camera.acquire(&AcquireRequest::any()).unwrap());

        let frame = stream.pull_frame().unwrap().unwrap();
        assert_eq!(frame.format(), PixelFormat::Rgba8);
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn test_unplug_interrupts_stream() {
        let camera = SyntheticCamera::new();
        let mut stream = LiveStream::new(camera.acquire(&AcquireRequest::any()).unwrap());

        camera.unplug();
        assert!(matches!(
            stream.pull_frame(),
            Err(CameraError::StreamInterrupted(_))
        ));
    }
}
