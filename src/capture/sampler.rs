//! Bounded-rate frame pulling on a dedicated thread.

use super::{CameraError, FrameSample, LiveStream, SamplerConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// What the sampling loop hands to its consumer.
#[derive(Debug)]
pub enum SampledEvent {
    /// A frame with positive dimensions, distinct from the previous one.
    Frame(FrameSample),
    /// The stream failed; the loop ends after this event.
    Interrupted(CameraError),
}

/// Consumer's answer after each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    /// Keep sampling.
    Continue,
    /// End the loop and release the stream.
    Stop,
}

/// The consumer's view of the stream while an event is being handled.
///
/// Lets the consumer release the camera before it publishes that
/// scanning has ended. The loop stops once the stream is released.
pub struct ActiveStream<'a> {
    stream: &'a mut LiveStream,
}

impl ActiveStream<'_> {
    /// Device the stream was acquired from.
    pub fn device_id(&self) -> &str {
        self.stream.device_id()
    }

    /// True until the stream has been released.
    pub fn is_live(&self) -> bool {
        self.stream.is_live()
    }

    /// Releases the stream now. Idempotent.
    pub fn release(&mut self) {
        self.stream.release();
    }
}

/// Counters shared between the loop and whoever reports on it.
#[derive(Debug, Default)]
pub struct SamplerStats {
    pulled: AtomicU64,
    skipped_empty: AtomicU64,
    skipped_duplicate: AtomicU64,
    delivered: AtomicU64,
}

impl SamplerStats {
    /// Frames returned by the stream.
    pub fn pulled(&self) -> u64 {
        self.pulled.load(Ordering::Relaxed)
    }

    /// Frames dropped before analysis (zero-sized or duplicate).
    pub fn skipped(&self) -> u64 {
        self.skipped_empty.load(Ordering::Relaxed) + self.skipped_duplicate.load(Ordering::Relaxed)
    }

    /// Frames passed to the consumer.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Pulls frames from a [`LiveStream`] at a bounded cadence.
///
/// Owns the stream: when the loop ends, for whatever reason, the stream
/// is released on the sampling thread after the last frame has been
/// consumed. A failed stream is released before the failure is reported.
pub struct FrameSampler {
    stream: Option<LiveStream>,
    config: SamplerConfig,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<SamplerStats>,
}

impl FrameSampler {
    /// Creates a stopped sampler over `stream`.
    pub fn new(stream: LiveStream, config: SamplerConfig) -> Self {
        Self::with_stats(stream, config, Arc::default())
    }

    /// Creates a sampler reporting into existing counters.
    pub fn with_stats(stream: LiveStream, config: SamplerConfig, stats: Arc<SamplerStats>) -> Self {
        Self {
            stream: Some(stream),
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            stats,
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<SamplerStats> {
        &self.stats
    }

    /// True while the loop thread is alive and not cancelled.
    pub fn is_running(&self) -> bool {
        !self.cancel.load(Ordering::SeqCst)
            && self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Starts the loop. Returns `false` (and does nothing) when a loop
    /// was already started or the sampler has been stopped.
    pub fn start<F>(&mut self, on_event: F) -> bool
    where
        F: FnMut(SampledEvent, &mut ActiveStream<'_>) -> LoopControl + Send + 'static,
    {
        if self.worker.is_some() {
            tracing::warn!("Frame sampler already running, ignoring start");
            return false;
        }
        if self.cancel.load(Ordering::SeqCst) {
            tracing::warn!("Frame sampler was stopped, ignoring start");
            return false;
        }
        let Some(stream) = self.stream.take() else {
            tracing::warn!("Frame sampler has no stream, ignoring start");
            return false;
        };

        let config = self.config.clone();
        let cancel = Arc::clone(&self.cancel);
        let stats = Arc::clone(&self.stats);
        let spawned = thread::Builder::new()
            .name("frame-sampler".into())
            .spawn(move || run_loop(stream, config, cancel, stats, on_event));

        match spawned {
            Ok(worker) => {
                tracing::debug!(fps = self.config.fps, "Frame sampler started");
                self.worker = Some(worker);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn frame sampler thread");
                false
            }
        }
    }

    /// Stops the loop and releases the stream. Safe from any state,
    /// including before `start` and from inside the event callback.
    ///
    /// From another thread this blocks until the current iteration has
    /// finished. From the sampling thread itself it only marks the loop
    /// cancelled; the loop releases the stream once the callback returns.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            worker.thread().unpark();
            if worker.join().is_err() {
                tracing::warn!("Frame sampler thread panicked");
            }
        }
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<F>(
    mut stream: LiveStream,
    config: SamplerConfig,
    cancel: Arc<AtomicBool>,
    stats: Arc<SamplerStats>,
    mut on_event: F,
) where
    F: FnMut(SampledEvent, &mut ActiveStream<'_>) -> LoopControl,
{
    let interval = config.interval();
    let mut previous = None;

    while !cancel.load(Ordering::SeqCst) {
        let tick = Instant::now();

        let control = match stream.pull_frame() {
            Ok(Some(frame)) => {
                stats.pulled.fetch_add(1, Ordering::Relaxed);
                if frame.is_empty() {
                    stats.skipped_empty.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Skipping zero-sized frame");
                    LoopControl::Continue
                } else if config.skip_duplicate_frames && {
                    let fingerprint = frame.fingerprint();
                    previous.replace(fingerprint) == Some(fingerprint)
                } {
                    stats.skipped_duplicate.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(sequence = frame.sequence(), "Skipping duplicate frame");
                    LoopControl::Continue
                } else if cancel.load(Ordering::SeqCst) {
                    LoopControl::Stop
                } else {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                    on_event(SampledEvent::Frame(frame), &mut ActiveStream { stream: &mut stream })
                }
            }
            Ok(None) => LoopControl::Continue,
            Err(e) => {
                stream.release();
                if !cancel.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "Camera stream failed");
                    on_event(SampledEvent::Interrupted(e), &mut ActiveStream { stream: &mut stream });
                }
                LoopControl::Stop
            }
        };

        if control == LoopControl::Stop || !stream.is_live() {
            break;
        }
        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            thread::park_timeout(rest);
        }
    }

    stream.release();
    tracing::debug!(
        delivered = stats.delivered(),
        skipped = stats.skipped(),
        "Frame sampler stopped"
    );
}
