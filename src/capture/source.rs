//! Camera acquisition with constraint relaxation and bounded waits.

use super::{
    AcquireRequest, AcquiredStream, CameraCapability, CameraConfig, CameraDevice, CameraError,
    Facing, LiveStream,
};
use crate::sync::lock;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Steps of the constraint-relaxation ladder, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderStep {
    /// Ideal resolution and frame rate plus explicit facing mode.
    Ideal,
    /// Facing mode only.
    FacingOnly,
    /// Any video device.
    AnyDevice,
}

impl LadderStep {
    /// All steps, strictest first.
    pub const ALL: [LadderStep; 3] = [LadderStep::Ideal, LadderStep::FacingOnly, LadderStep::AnyDevice];

    /// Builds the request for this step.
    pub fn request(self, device_id: Option<&str>, facing: Facing, config: &CameraConfig) -> AcquireRequest {
        match self {
            LadderStep::Ideal => AcquireRequest {
                device_id: device_id.map(str::to_owned),
                facing: Some(facing),
                ideal: Some(config.ideal()),
            },
            LadderStep::FacingOnly => AcquireRequest {
                device_id: device_id.map(str::to_owned),
                facing: Some(facing),
                ideal: None,
            },
            LadderStep::AnyDevice => AcquireRequest::any(),
        }
    }
}

/// Negotiates device access on top of a host [`CameraCapability`].
///
/// At most one acquisition is in flight at a time. An attempt abandoned
/// on timeout is waited for before the next request goes out.
#[derive(Clone)]
pub struct CameraSource {
    capability: Arc<dyn CameraCapability>,
    config: CameraConfig,
    straggler: Arc<Mutex<Option<Arc<Rendezvous>>>>,
}

impl CameraSource {
    /// Creates a source over the given capability.
    pub fn new(capability: Arc<dyn CameraCapability>, config: CameraConfig) -> Self {
        Self {
            capability,
            config,
            straggler: Arc::default(),
        }
    }

    /// Returns the acquisition configuration.
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Lists devices. An empty list is reported as `NoDeviceFound`.
    pub fn enumerate(&self) -> Result<Vec<CameraDevice>, CameraError> {
        let devices = self.capability.enumerate_devices()?;
        if devices.is_empty() {
            return Err(CameraError::NoDeviceFound);
        }
        tracing::debug!(count = devices.len(), "Enumerated camera devices");
        Ok(devices)
    }

    /// Acquires a stream, relaxing constraints step by step.
    ///
    /// Each attempt is bounded by the configured timeout. A permission
    /// denial ends the ladder immediately; any other failure moves on to
    /// the next step. The last failure is returned when every step fails.
    pub fn acquire(&self, device_id: Option<&str>, facing: Facing) -> Result<LiveStream, CameraError> {
        let timeout = self.config.acquire_timeout();
        let mut straggler = lock(&self.straggler);
        let mut last_error = CameraError::NoDeviceFound;

        for step in LadderStep::ALL {
            let deadline = Instant::now() + timeout;
            let request = step.request(device_id, facing, &self.config);

            let outcome = match straggler.take() {
                Some(pending) if !pending.wait_finished(deadline) => {
                    tracing::debug!(?step, "Previous camera request still pending");
                    *straggler = Some(pending);
                    Err(CameraError::Timeout(timeout))
                }
                _ => {
                    tracing::debug!(?step, ?request, "Requesting camera stream");
                    bounded_acquire(&self.capability, request, deadline, timeout, &mut straggler)
                }
            };

            match outcome {
                Ok(acquired) => {
                    tracing::info!(?step, device = %acquired.device_id, "Camera stream acquired");
                    return Ok(LiveStream::new(acquired));
                }
                Err(CameraError::PermissionDenied(reason)) => {
                    tracing::warn!(%reason, "Camera permission denied");
                    return Err(CameraError::PermissionDenied(reason));
                }
                Err(e) => {
                    tracing::debug!(?step, error = %e, "Camera request failed, relaxing constraints");
                    last_error = e;
                }
            }
        }

        tracing::warn!(error = %last_error, "Camera acquisition failed on every ladder step");
        Err(last_error)
    }
}

#[derive(Default)]
struct Slot {
    outcome: Option<Result<AcquiredStream, CameraError>>,
    abandoned: bool,
    finished: bool,
}

#[derive(Default)]
struct Rendezvous {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Rendezvous {
    /// Waits until the helper has returned and let go of any late
    /// stream. False if `deadline` passes first.
    fn wait_finished(&self, deadline: Instant) -> bool {
        let mut slot = lock(&self.slot);
        loop {
            if slot.finished {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            slot = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Runs one acquisition on a helper thread and waits until `deadline`.
///
/// If the wait expires the attempt is marked abandoned and parked in
/// `straggler`; a stream that shows up afterwards is released by the
/// helper instead of leaking a second live device.
fn bounded_acquire(
    capability: &Arc<dyn CameraCapability>,
    request: AcquireRequest,
    deadline: Instant,
    timeout: Duration,
    straggler: &mut Option<Arc<Rendezvous>>,
) -> Result<AcquiredStream, CameraError> {
    let rendezvous = Arc::new(Rendezvous::default());
    let worker = Arc::clone(&rendezvous);
    let capability = Arc::clone(capability);

    thread::Builder::new()
        .name("camera-acquire".into())
        .spawn(move || {
            let outcome = capability.acquire(&request);
            let mut slot = lock(&worker.slot);
            if slot.abandoned {
                if let Ok(mut late) = outcome {
                    tracing::warn!(device = %late.device_id, "Releasing camera acquired after timeout");
                    late.handle.release();
                }
            } else {
                slot.outcome = Some(outcome);
            }
            slot.finished = true;
            worker.ready.notify_all();
        })
        .map_err(|e| CameraError::Backend(format!("failed to spawn acquisition thread: {e}")))?;

    let mut slot = lock(&rendezvous.slot);
    loop {
        if let Some(outcome) = slot.outcome.take() {
            return outcome;
        }
        let now = Instant::now();
        if now >= deadline {
            slot.abandoned = true;
            drop(slot);
            *straggler = Some(rendezvous);
            return Err(CameraError::Timeout(timeout));
        }
        slot = rendezvous
            .ready
            .wait_timeout(slot, deadline - now)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AcquireScript, SyntheticCamera};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> CameraConfig {
        CameraConfig {
            acquire_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_step_carries_ideal_constraints() {
        let camera = Arc::new(SyntheticCamera::new());
        let source = CameraSource::new(camera.clone(), fast_config());

        let stream = source.acquire(None, Facing::Back).unwrap();

        assert_eq!(stream.device_id(), "synthetic-back");
        let requests = camera.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].ideal.is_some());
        assert_eq!(requests[0].facing, Some(Facing::Back));
    }

    #[test]
    fn test_ladder_relaxes_on_unsupported() {
        let camera = Arc::new(SyntheticCamera::new().with_script(vec![
            AcquireScript::Fail(CameraError::DeviceUnsupported("1280x720".into())),
            AcquireScript::Fail(CameraError::DeviceUnsupported("facingMode".into())),
        ]));
        let source = CameraSource::new(camera.clone(), fast_config());

        let stream = source.acquire(Some("synthetic-front"), Facing::Front).unwrap();

        let requests = camera.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].ideal, None);
        assert_eq!(requests[1].device_id.as_deref(), Some("synthetic-front"));
        assert_eq!(requests[2], AcquireRequest::any());
        assert!(stream.is_live());
    }

    #[test]
    fn test_permission_denied_stops_ladder() {
        let camera = Arc::new(SyntheticCamera::new().with_script(vec![AcquireScript::Fail(
            CameraError::PermissionDenied("NotAllowedError".into()),
        )]));
        let source = CameraSource::new(camera.clone(), fast_config());

        let result = source.acquire(None, Facing::Back);

        assert!(matches!(result, Err(CameraError::PermissionDenied(_))));
        assert_eq!(camera.requests().len(), 1);
    }

    #[test]
    fn test_every_step_times_out() {
        let camera = Arc::new(
            SyntheticCamera::new().with_acquire_delay(Duration::from_millis(1_500)),
        );
        let source = CameraSource::new(camera.clone(), fast_config());

        let result = source.acquire(None, Facing::Back);

        assert!(matches!(result, Err(CameraError::Timeout(_))));
        // Each step waits out the one before it instead of overlapping.
        assert_eq!(camera.requests().len(), 2);

        // Late acquisitions must be released, never left live.
        std::thread::sleep(Duration::from_millis(1_000));
        assert_eq!(camera.live_streams(), 0);
        assert!(camera.max_live_streams() <= 1);
    }

    /// Stalls the first acquisition only.
    struct SlowFirst {
        camera: SyntheticCamera,
        calls: AtomicUsize,
    }

    impl CameraCapability for SlowFirst {
        fn enumerate_devices(&self) -> Result<Vec<CameraDevice>, CameraError> {
            self.camera.enumerate_devices()
        }

        fn acquire(&self, request: &AcquireRequest) -> Result<AcquiredStream, CameraError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(1_500));
            }
            self.camera.acquire(request)
        }
    }

    #[test]
    fn test_relaxed_step_waits_for_abandoned_request() {
        let slow = Arc::new(SlowFirst {
            camera: SyntheticCamera::new(),
            calls: AtomicUsize::new(0),
        });
        let source = CameraSource::new(slow.clone(), fast_config());

        let stream = source.acquire(None, Facing::Back).unwrap();

        assert!(stream.is_live());
        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
        assert_eq!(slow.camera.live_streams(), 1);
        assert_eq!(slow.camera.max_live_streams(), 1);
        assert_eq!(slow.camera.acquisitions(), 2);
    }

    #[test]
    fn test_next_acquire_waits_for_abandoned_request() {
        let camera = Arc::new(
            SyntheticCamera::new().with_acquire_delay(Duration::from_millis(1_500)),
        );
        let source = CameraSource::new(camera.clone(), fast_config());
        assert!(source.acquire(None, Facing::Back).is_err());

        // The second ladder's first step waits for the straggler left
        // behind by the first ladder before issuing anything.
        let requests = camera.requests().len();
        let _ = source.acquire(None, Facing::Back);
        assert!(camera.requests().len() <= requests + 2);
        std::thread::sleep(Duration::from_millis(1_600));
        assert_eq!(camera.live_streams(), 0);
        assert!(camera.max_live_streams() <= 1);
    }

    #[test]
    fn test_empty_enumeration_is_no_device() {
        let camera = Arc::new(SyntheticCamera::with_devices(Vec::new()));
        let source = CameraSource::new(camera, fast_config());

        assert!(matches!(source.enumerate(), Err(CameraError::NoDeviceFound)));
    }
}
