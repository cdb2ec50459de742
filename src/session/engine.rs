//! The scan session: camera ownership, frame loop and result delivery.

use super::{
    AcceptedCode, ConfirmationTone, ResultSource, ScanError, ScanOptions, ScanResult, ScanState,
    SessionConfig, SessionEvent, SessionStats, SilentSink, ToneSink,
};
use crate::capture::{
    ActiveStream, CameraCapability, CameraConfig, CameraDevice, CameraSource, Facing,
    FrameSample, FrameSampler, LoopControl, SampledEvent, SamplerConfig, SamplerStats,
};
use crate::config::FileConfig;
use crate::decoding::{BarcodeCandidate, BarcodeFormat, DecodeBackend, DecoderFault, Ean13Backend};
use crate::extraction::{ExtractorConfig, SignalExtractor};
use crate::sync::lock;
use crate::validation::{CandidateValidator, DebounceGate, ValidationConfig};
use chrono::Utc;
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

thread_local! {
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Runs `f` marked as a session callback.
fn as_callback<R>(f: impl FnOnce() -> R) -> R {
    let outer = IN_CALLBACK.with(|flag| flag.replace(true));
    let result = f();
    IN_CALLBACK.with(|flag| flag.set(outer));
    result
}

fn in_callback() -> bool {
    IN_CALLBACK.with(Cell::get)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_owned())
}

/// Configures and builds a [`ScanSession`].
pub struct ScanSessionBuilder {
    capability: Arc<dyn CameraCapability>,
    camera: CameraConfig,
    sampler: SamplerConfig,
    extractor: ExtractorConfig,
    validation: ValidationConfig,
    session: SessionConfig,
    backends: Vec<Box<dyn DecodeBackend>>,
    tone_sink: Arc<dyn ToneSink>,
}

impl ScanSessionBuilder {
    fn new(capability: Arc<dyn CameraCapability>) -> Self {
        Self {
            capability,
            camera: CameraConfig::default(),
            sampler: SamplerConfig::default(),
            extractor: ExtractorConfig::default(),
            validation: ValidationConfig::default(),
            session: SessionConfig::default(),
            backends: Vec::new(),
            tone_sink: Arc::new(SilentSink),
        }
    }

    /// Takes every section from a loaded configuration file.
    pub fn file_config(self, config: &FileConfig) -> Self {
        self.camera(config.camera.clone())
            .sampler(config.sampler.clone())
            .extractor(config.extractor.clone())
            .validation(config.validation.clone())
            .session(config.session.clone())
    }

    /// Sets camera selection and acquisition limits.
    pub fn camera(mut self, config: CameraConfig) -> Self {
        self.camera = config;
        self
    }

    /// Sets the frame sampling cadence.
    pub fn sampler(mut self, config: SamplerConfig) -> Self {
        self.sampler = config;
        self
    }

    /// Sets scan line extraction for the EAN-13 backend.
    pub fn extractor(mut self, config: ExtractorConfig) -> Self {
        self.extractor = config;
        self
    }

    /// Sets candidate acceptance rules.
    pub fn validation(mut self, config: ValidationConfig) -> Self {
        self.validation = config;
        self
    }

    /// Sets cooldown, continuous mode and tone.
    pub fn session(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Adds a backend, tried after the native EAN-13 backend.
    pub fn backend(mut self, backend: impl DecodeBackend + 'static) -> Self {
        self.backends.push(Box::new(backend));
        self
    }

    /// Sets where the confirmation tone is played.
    pub fn tone_sink(mut self, sink: impl ToneSink + 'static) -> Self {
        self.tone_sink = Arc::new(sink);
        self
    }

    /// Validates the configuration and builds the session.
    pub fn build(self) -> Result<ScanSession, ScanError> {
        self.camera.validate()?;
        self.sampler.validate()?;
        self.extractor.validate()?;
        self.session.validate()?;

        let mut backends: Vec<Box<dyn DecodeBackend>> =
            vec![Box::new(Ean13Backend::new(SignalExtractor::new(self.extractor)))];
        backends.extend(self.backends);

        let tone = self.session.tone.then(|| {
            let tone = ConfirmationTone::default();
            Tone {
                samples: tone.samples().into(),
                sample_rate: tone.sample_rate,
                sink: self.tone_sink,
            }
        });

        Ok(ScanSession {
            inner: Arc::new(Inner {
                source: CameraSource::new(self.capability, self.camera),
                sampler_config: self.sampler,
                validator: CandidateValidator::new(self.validation),
                backends,
                tone,
                sampler_stats: Arc::default(),
                acquiring: Mutex::new(()),
                core: Mutex::new(Core::new(self.session.cooldown())),
            }),
        })
    }
}

/// A barcode scanning session over one camera capability.
///
/// The session holds at most one live camera stream at a time and
/// releases it on every path out of scanning: detection in single-shot
/// mode, close, camera switch, stream failure and drop.
///
/// ```no_run
/// use optical_barcode::capture::SyntheticCamera;
/// use optical_barcode::session::{ScanOptions, ScanSession};
/// use std::sync::Arc;
///
/// let camera = Arc::new(SyntheticCamera::new());
/// camera.show("4006381333931");
///
/// let session = ScanSession::new(camera).unwrap();
/// session
///     .open(ScanOptions::new(|result| println!("scanned {}", result.code)))
///     .unwrap();
/// ```
pub struct ScanSession {
    inner: Arc<Inner>,
}

struct Tone {
    samples: Arc<[f32]>,
    sample_rate: u32,
    sink: Arc<dyn ToneSink>,
}

struct Inner {
    source: CameraSource,
    sampler_config: SamplerConfig,
    validator: CandidateValidator,
    backends: Vec<Box<dyn DecodeBackend>>,
    tone: Option<Tone>,
    sampler_stats: Arc<SamplerStats>,
    /// Held for the whole of an acquisition, so a superseded one has
    /// released its stream before the next one starts.
    acquiring: Mutex<()>,
    core: Mutex<Core>,
}

#[derive(Debug, Default)]
struct Counters {
    scan_count: u64,
    rejected: u64,
    debounced: u64,
    decoder_faults: u64,
    results: u64,
    manual_results: u64,
    acquisitions: u64,
}

/// Mutable session state. Every field changes under one lock.
struct Core {
    state: ScanState,
    /// Bumped whenever an acquisition or sampling loop is superseded.
    generation: u64,
    options: Option<Arc<ScanOptions>>,
    devices: Vec<CameraDevice>,
    device: Option<CameraDevice>,
    sampler: Option<FrameSampler>,
    gate: DebounceGate,
    resume_at: Option<Instant>,
    last_accepted: Option<AcceptedCode>,
    counters: Counters,
}

impl Core {
    fn new(cooldown: Duration) -> Self {
        Self {
            state: ScanState::Idle,
            generation: 0,
            options: None,
            devices: Vec::new(),
            device: None,
            sampler: None,
            gate: DebounceGate::new(cooldown),
            resume_at: None,
            last_accepted: None,
            counters: Counters::default(),
        }
    }

    fn apply(&mut self, event: SessionEvent) -> Result<ScanState, super::InvalidTransition> {
        let next = self.state.next(event)?;
        if next != self.state {
            info!(from = %self.state, to = %next, ?event, "Scan session transition");
        }
        self.state = next;
        Ok(next)
    }

    fn continuous(&self) -> bool {
        self.options.as_ref().is_some_and(|o| o.continuous)
    }

    /// Records an accepted code. Code and timestamp change together.
    fn accept(&mut self, code: String, format: BarcodeFormat, source: ResultSource) -> ScanResult {
        let at = Utc::now();
        self.last_accepted = Some(AcceptedCode {
            code: code.clone(),
            at,
        });
        self.counters.results += 1;
        ScanResult {
            code,
            format,
            source,
            accepted_at: at,
        }
    }
}

impl ScanSession {
    /// Starts configuring a session.
    pub fn builder(capability: Arc<dyn CameraCapability>) -> ScanSessionBuilder {
        ScanSessionBuilder::new(capability)
    }

    /// A session with default configuration.
    pub fn new(capability: Arc<dyn CameraCapability>) -> Result<Self, ScanError> {
        Self::builder(capability).build()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.inner.core().state
    }

    /// Camera currently (or last) in use.
    pub fn device(&self) -> Option<CameraDevice> {
        self.inner.core().device.clone()
    }

    /// Cameras found by the last enumeration.
    pub fn devices(&self) -> Vec<CameraDevice> {
        self.inner.core().devices.clone()
    }

    /// Candidates evaluated so far.
    pub fn scan_count(&self) -> u64 {
        self.inner.core().counters.scan_count
    }

    /// Last accepted code and when it was accepted.
    pub fn last_accepted(&self) -> Option<AcceptedCode> {
        self.inner.core().last_accepted.clone()
    }

    /// Snapshot of the session counters.
    pub fn stats(&self) -> SessionStats {
        let core = self.inner.core();
        let sampler = &self.inner.sampler_stats;
        SessionStats {
            state: core.state,
            device: core.device.clone(),
            frames_sampled: sampler.pulled(),
            frames_skipped: sampler.skipped(),
            scan_count: core.counters.scan_count,
            rejected: core.counters.rejected,
            debounced: core.counters.debounced,
            decoder_faults: core.counters.decoder_faults,
            results: core.counters.results,
            manual_results: core.counters.manual_results,
            acquisitions: core.counters.acquisitions,
            last_accepted: core.last_accepted.clone(),
        }
    }

    /// Acquires a camera and starts scanning.
    ///
    /// Blocks until a stream is live or every acquisition attempt has
    /// failed. Failures move the session to `Error` and are also passed
    /// to the error callback.
    pub fn open(&self, options: ScanOptions) -> Result<(), ScanError> {
        let generation = {
            let mut core = self.inner.core();
            core.apply(SessionEvent::Open)?;
            core.gate = DebounceGate::new(options.cooldown);
            core.options = Some(Arc::new(options));
            core.generation += 1;
            core.generation
        };
        self.inner.initialize(generation, None)
    }

    /// Tries the last camera again after an error.
    pub fn retry(&self) -> Result<(), ScanError> {
        let (generation, device_id) = {
            let mut core = self.inner.core();
            if in_callback() {
                return Err(ScanError::InvalidState {
                    operation: "retry from a session callback",
                    state: core.state,
                });
            }
            core.apply(SessionEvent::Retry)?;
            core.generation += 1;
            (core.generation, core.device.as_ref().map(|d| d.id.clone()))
        };
        self.inner.initialize(generation, device_id)
    }

    /// Switches to the next enumerated camera.
    pub fn switch_camera(&self) -> Result<(), ScanError> {
        let target = {
            let core = self.inner.core();
            core.state.next(SessionEvent::Switch)?;
            if core.devices.len() < 2 {
                return Err(ScanError::NoAlternateCamera);
            }
            let current = core
                .device
                .as_ref()
                .and_then(|d| core.devices.iter().position(|c| c.id == d.id));
            let next = current.map_or(0, |i| (i + 1) % core.devices.len());
            core.devices[next].id.clone()
        };
        self.switch_camera_to(&target)
    }

    /// Switches to the camera with `device_id`.
    ///
    /// The current stream is released before the new one is requested.
    /// Not allowed from inside a session callback.
    pub fn switch_camera_to(&self, device_id: &str) -> Result<(), ScanError> {
        let (generation, sampler) = {
            let mut core = self.inner.core();
            if in_callback() {
                return Err(ScanError::InvalidState {
                    operation: "switch camera from a session callback",
                    state: core.state,
                });
            }
            core.apply(SessionEvent::Switch)?;
            core.generation += 1;
            core.resume_at = None;
            (core.generation, core.sampler.take())
        };
        if let Some(mut sampler) = sampler {
            sampler.stop();
        }
        info!(device = device_id, "Switching camera");
        self.inner.initialize(generation, Some(device_id.to_owned()))
    }

    /// Accepts a code typed by the operator.
    ///
    /// Surrounding whitespace is ignored. The code is validated like a
    /// decoded one but is not subject to debounce. In single-shot mode an
    /// accepted code finishes the session and releases the camera.
    pub fn submit_manual(&self, text: &str) -> Result<ScanResult, ScanError> {
        let text = text.trim();
        let mut core = self.inner.core();
        if core.state == ScanState::Closed {
            return Err(ScanError::InvalidState {
                operation: "submit a manual code",
                state: core.state,
            });
        }

        core.counters.scan_count += 1;
        let code = match self.inner.validator.validate(text) {
            Ok(code) => code,
            Err(rejection) => {
                core.counters.rejected += 1;
                debug!(%rejection, "Manual entry rejected");
                return Err(rejection.into());
            }
        };

        let now = Instant::now();
        let continuous = core.continuous();
        let before = core.state;
        match before {
            ScanState::Scanning => {
                let _ = core.apply(SessionEvent::Detect);
                if continuous {
                    core.resume_at = Some(now + core.gate.cooldown());
                }
            }
            ScanState::Initializing | ScanState::Error if !continuous => {
                let _ = core.apply(SessionEvent::Finish);
                core.generation += 1;
            }
            _ => {}
        }
        core.gate.record(&code, now);
        core.counters.manual_results += 1;
        let result = core.accept(code, BarcodeFormat::Manual, ResultSource::Manual);
        let options = core.options.clone();
        drop(core);

        info!(code = %result.code, "Manual code accepted");
        self.inner.confirm();
        self.inner.deliver(options.as_deref(), &result);

        if before == ScanState::Scanning && !continuous {
            let sampler = {
                let mut core = self.inner.core();
                if core.state != ScanState::Detected {
                    return Ok(result);
                }
                core.sampler.take()
            };
            if let Some(mut sampler) = sampler {
                sampler.stop();
            }
            let mut core = self.inner.core();
            if core.state == ScanState::Detected {
                let _ = core.apply(SessionEvent::Finish);
            }
        }
        Ok(result)
    }

    /// Stops scanning and releases the camera. Idempotent; safe before
    /// `open`, during acquisition and from inside a callback.
    pub fn close(&self) {
        let sampler = {
            let mut core = self.inner.core();
            if core.state == ScanState::Closed {
                return;
            }
            let _ = core.apply(SessionEvent::Close);
            core.resume_at = None;
            core.sampler.take()
        };
        if let Some(mut sampler) = sampler {
            sampler.stop();
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn core(&self) -> MutexGuard<'_, Core> {
        lock(&self.core)
    }

    /// Acquires a stream for `generation` and starts the sampling loop.
    fn initialize(self: &Arc<Self>, generation: u64, device_id: Option<String>) -> Result<(), ScanError> {
        let _acquiring = lock(&self.acquiring);
        let facing = {
            let core = self.core();
            if core.generation != generation {
                debug!(generation, "Camera acquisition superseded before it started");
                return Err(ScanError::Cancelled);
            }
            core.options.as_ref().map(|o| o.preferred_facing).unwrap_or_default()
        };
        let device_id = device_id.or_else(|| self.source.config().device_id.clone());
        debug!(generation, device = ?device_id, %facing, "Acquiring camera");

        let outcome = self.source.enumerate().and_then(|devices| {
            let stream = self.source.acquire(device_id.as_deref(), facing)?;
            Ok((devices, stream))
        });

        let mut core = self.core();
        if core.generation != generation || core.state != ScanState::Initializing {
            drop(core);
            if let Ok((_, mut stream)) = outcome {
                stream.release();
            }
            debug!(generation, "Camera acquisition superseded");
            return Err(ScanError::Cancelled);
        }

        let (devices, stream) = match outcome {
            Ok(acquired) => acquired,
            Err(e) => {
                let error = ScanError::from(e);
                let _ = core.apply(SessionEvent::AcquireFailed);
                let options = core.options.clone();
                drop(core);
                self.report_error(options.as_deref(), &error);
                return Err(error);
            }
        };

        let device = devices
            .iter()
            .find(|d| d.id == stream.device_id())
            .cloned()
            .unwrap_or_else(|| CameraDevice::new(stream.device_id(), stream.device_id(), Facing::Unknown));
        info!(device = %device.id, label = %device.label, "Camera acquired");
        core.device = Some(device);
        core.devices = devices;
        core.counters.acquisitions += 1;
        let _ = core.apply(SessionEvent::Acquired);

        let mut sampler = FrameSampler::with_stats(
            stream,
            self.sampler_config.clone(),
            Arc::clone(&self.sampler_stats),
        );
        let weak = Arc::downgrade(self);
        let started = sampler.start(move |event, stream| match weak.upgrade() {
            Some(inner) => inner.on_sampled(generation, event, stream),
            None => LoopControl::Stop,
        });
        if !started {
            let _ = core.apply(SessionEvent::StreamLost);
            let options = core.options.clone();
            drop(core);
            drop(sampler);
            let error = ScanError::StreamInterrupted("frame sampler did not start".into());
            self.report_error(options.as_deref(), &error);
            return Err(error);
        }
        core.sampler = Some(sampler);
        Ok(())
    }

    fn on_sampled(
        self: &Arc<Self>,
        generation: u64,
        event: SampledEvent,
        stream: &mut ActiveStream<'_>,
    ) -> LoopControl {
        match event {
            SampledEvent::Frame(frame) => self.on_frame(generation, frame, stream),
            SampledEvent::Interrupted(e) => {
                let mut core = self.core();
                stream.release();
                if core.generation != generation || core.apply(SessionEvent::StreamLost).is_err() {
                    return LoopControl::Stop;
                }
                core.resume_at = None;
                let sampler = core.sampler.take();
                let options = core.options.clone();
                drop(core);
                drop(sampler);
                self.report_error(options.as_deref(), &ScanError::from(e));
                LoopControl::Stop
            }
        }
    }

    fn on_frame(&self, generation: u64, frame: FrameSample, stream: &mut ActiveStream<'_>) -> LoopControl {
        {
            let mut core = self.core();
            if core.generation != generation {
                return LoopControl::Stop;
            }
            match core.state {
                ScanState::Scanning => {}
                ScanState::Detected => match core.resume_at {
                    Some(at) if Instant::now() >= at => {
                        core.resume_at = None;
                        let _ = core.apply(SessionEvent::Resume);
                    }
                    _ => return LoopControl::Continue,
                },
                _ => return LoopControl::Stop,
            }
        }

        trace!(sequence = frame.sequence(), "Analyzing frame");
        let (found, faults) = self.decode(&frame);
        drop(frame);

        let mut core = self.core();
        core.counters.decoder_faults += faults;
        let Some((candidate, backend)) = found else {
            return LoopControl::Continue;
        };
        // A close or switch may have landed while decoding.
        if core.generation != generation || core.state != ScanState::Scanning {
            return LoopControl::Continue;
        }

        core.counters.scan_count += 1;
        let code = match self.validator.validate(&candidate.text) {
            Ok(code) => code,
            Err(rejection) => {
                core.counters.rejected += 1;
                debug!(%rejection, backend = %backend, "Candidate rejected");
                return LoopControl::Continue;
            }
        };
        let now = Instant::now();
        if !core.gate.admit(&code, now) {
            core.counters.debounced += 1;
            return LoopControl::Continue;
        }

        let _ = core.apply(SessionEvent::Detect);
        let continuous = core.continuous();
        if continuous {
            core.resume_at = Some(now + core.gate.cooldown());
        }
        let result = core.accept(code, candidate.format, ResultSource::Camera { backend });
        let options = core.options.clone();
        drop(core);

        info!(code = %result.code, format = %result.format, "Barcode detected");
        self.confirm();
        self.deliver(options.as_deref(), &result);

        if continuous {
            return LoopControl::Continue;
        }
        // The camera goes before `Idle` becomes visible.
        let mut core = self.core();
        if core.generation == generation && core.state == ScanState::Detected {
            stream.release();
            if core.apply(SessionEvent::Finish).is_ok() {
                let sampler = core.sampler.take();
                drop(core);
                drop(sampler);
            }
        }
        LoopControl::Stop
    }

    /// Runs the backends in order until one reports a candidate.
    /// Returns the candidate with its backend name, and the fault count.
    fn decode(&self, frame: &FrameSample) -> (Option<(BarcodeCandidate, String)>, u64) {
        let mut faults = 0;
        for backend in &self.backends {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| backend.decode(frame)))
                .unwrap_or_else(|payload| {
                    Err(DecoderFault::new(backend.name(), panic_message(payload.as_ref())))
                });
            match outcome {
                Ok(Some(candidate)) => return (Some((candidate, backend.name().to_owned())), faults),
                Ok(None) => {}
                Err(fault) => {
                    faults += 1;
                    warn!(%fault, "Decoder fault");
                }
            }
        }
        (None, faults)
    }

    fn deliver(&self, options: Option<&ScanOptions>, result: &ScanResult) {
        let Some(options) = options else {
            return;
        };
        let callback = options.result_callback();
        let outcome = as_callback(|| panic::catch_unwind(AssertUnwindSafe(|| callback(result))));
        if outcome.is_err() {
            error!(code = %result.code, "Result callback panicked");
        }
    }

    fn report_error(&self, options: Option<&ScanOptions>, error: &ScanError) {
        let kind = error.kind();
        if kind.is_user_actionable() {
            warn!(%error, ?kind, "Scan session failed");
        } else {
            error!(%error, ?kind, "Scan session failed");
        }
        if let Some(callback) = options.and_then(ScanOptions::error_callback) {
            let outcome = as_callback(|| panic::catch_unwind(AssertUnwindSafe(|| callback(error))));
            if outcome.is_err() {
                error!("Error callback panicked");
            }
        }
    }

    /// Plays the confirmation tone without waiting for it.
    fn confirm(&self) {
        let Some(tone) = &self.tone else {
            return;
        };
        let samples = Arc::clone(&tone.samples);
        let sink = Arc::clone(&tone.sink);
        let sample_rate = tone.sample_rate;
        let spawned = thread::Builder::new()
            .name("confirmation-tone".into())
            .spawn(move || {
                if let Err(e) = sink.play(&samples, sample_rate) {
                    warn!(error = %e, "Confirmation tone failed");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Could not start confirmation tone");
        }
    }
}
