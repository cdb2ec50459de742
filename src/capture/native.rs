//! Real camera capture through `nokhwa`.
//!
//! `nokhwa::Camera` is not `Send` on every platform, so each stream owns
//! a worker thread that creates the camera, keeps the latest decoded
//! frame in a slot, and closes the device when asked to stop.

use super::{
    AcquireRequest, AcquiredStream, CameraCapability, CameraDevice, CameraError, Facing,
    FrameSample, PixelFormat, StreamHandle,
};
use crate::sync::lock;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
    RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Camera capability backed by the platform's native capture API.
#[derive(Debug, Default)]
pub struct NativeCamera;

impl NativeCamera {
    /// Creates the capability. Devices are queried lazily.
    pub fn new() -> Self {
        Self
    }

    fn query() -> Result<Vec<CameraInfo>, CameraError> {
        nokhwa::query(ApiBackend::Auto).map_err(|e| CameraError::Backend(e.to_string()))
    }

    fn describe(info: &CameraInfo) -> CameraDevice {
        let label = info.human_name();
        CameraDevice::new(info.index().to_string(), label.clone(), Facing::from_label(&label))
    }

    fn select(request: &AcquireRequest) -> Result<(CameraIndex, String), CameraError> {
        let cameras = Self::query()?;
        let chosen = match (&request.device_id, request.facing) {
            (Some(id), _) => cameras
                .iter()
                .find(|c| &c.index().to_string() == id)
                .ok_or(CameraError::NoDeviceFound)?,
            (None, Some(facing)) => cameras
                .iter()
                .find(|c| Facing::from_label(&c.human_name()) == facing)
                .ok_or_else(|| CameraError::DeviceUnsupported(format!("no {facing} camera")))?,
            (None, None) => cameras.first().ok_or(CameraError::NoDeviceFound)?,
        };
        Ok((chosen.index().clone(), chosen.index().to_string()))
    }

    fn format(request: &AcquireRequest) -> RequestedFormat<'static> {
        let kind = match request.ideal {
            Some(ideal) => RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(ideal.width, ideal.height),
                FrameFormat::MJPEG,
                ideal.fps,
            )),
            None => RequestedFormatType::None,
        };
        RequestedFormat::new::<RgbFormat>(kind)
    }
}

impl CameraCapability for NativeCamera {
    fn enumerate_devices(&self) -> Result<Vec<CameraDevice>, CameraError> {
        Ok(Self::query()?.iter().map(Self::describe).collect())
    }

    fn acquire(&self, request: &AcquireRequest) -> Result<AcquiredStream, CameraError> {
        let (index, device_id) = Self::select(request)?;
        let format = Self::format(request);

        let slot = Arc::new(Mutex::new(Latest::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("native-camera".into())
                .spawn(move || capture_loop(index, format, slot, stop, ready_tx))
                .map_err(|e| CameraError::Backend(e.to_string()))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(AcquiredStream {
                handle: Box::new(NativeStream {
                    slot,
                    stop,
                    worker: Some(worker),
                    sequence: 0,
                }),
                device_id,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CameraError::Backend("camera worker exited".into())),
        }
    }
}

#[derive(Default)]
struct Latest {
    frame: Option<(Vec<u8>, u32, u32)>,
    failure: Option<CameraError>,
}

fn classify(error: nokhwa::NokhwaError) -> CameraError {
    let message = error.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        CameraError::PermissionDenied(message)
    } else if lower.contains("format") || lower.contains("resolution") {
        CameraError::DeviceUnsupported(message)
    } else {
        CameraError::Backend(message)
    }
}

fn capture_loop(
    index: CameraIndex,
    format: RequestedFormat<'static>,
    slot: Arc<Mutex<Latest>>,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), CameraError>>,
) {
    let mut camera = match Camera::new(index, format).and_then(|mut c| c.open_stream().map(|_| c)) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(classify(e)));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    while !stop.load(Ordering::SeqCst) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>());
        match decoded {
            Ok(image) => {
                let (width, height) = (image.width(), image.height());
                lock(&slot).frame = Some((image.into_raw(), width, height));
            }
            Err(e) => {
                lock(&slot).failure = Some(CameraError::StreamInterrupted(e.to_string()));
                break;
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!(error = %e, "Failed to stop native camera stream");
    }
}

struct NativeStream {
    slot: Arc<Mutex<Latest>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    sequence: u64,
}

impl StreamHandle for NativeStream {
    fn pull_frame(&mut self) -> Result<Option<FrameSample>, CameraError> {
        let mut latest = lock(&self.slot);
        if let Some(failure) = latest.failure.take() {
            return Err(failure);
        }
        let Some((pixels, width, height)) = latest.frame.take() else {
            return Ok(None);
        };
        self.sequence += 1;
        Ok(Some(FrameSample::new(
            pixels,
            width,
            height,
            PixelFormat::Rgb8,
            self.sequence,
        )))
    }

    fn release(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Native camera worker panicked");
            }
        }
    }
}
