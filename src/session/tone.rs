//! Audible confirmation after an accepted scan.

use std::time::Duration;
use thiserror::Error;

/// Failure to play a tone. Logged, never propagated to the caller.
#[derive(Debug, Clone, Error)]
pub enum ToneError {
    /// No usable audio output.
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
}

/// Synthesized beep: a sine tone that decays exponentially to silence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationTone {
    /// Pitch in hertz.
    pub frequency_hz: f32,
    /// Length of the tone.
    pub duration: Duration,
    /// Output sample rate.
    pub sample_rate: u32,
    /// Initial gain in [0, 1].
    pub volume: f32,
}

impl Default for ConfirmationTone {
    fn default() -> Self {
        Self {
            frequency_hz: 800.0,
            duration: Duration::from_millis(200),
            sample_rate: 44_100,
            volume: 0.3,
        }
    }
}

/// Gain the envelope decays to before the final silent sample.
const FLOOR_GAIN: f32 = 0.01;

impl ConfirmationTone {
    /// Mono PCM samples in [-1, 1]. The last sample is exactly zero.
    pub fn samples(&self) -> Vec<f32> {
        let count = (self.duration.as_secs_f64() * f64::from(self.sample_rate)).round() as usize;
        if count == 0 {
            return Vec::new();
        }
        let volume = self.volume.clamp(0.0, 1.0);
        let floor = FLOOR_GAIN.min(volume);
        let rate = self.sample_rate as f32;
        let step = std::f32::consts::TAU * self.frequency_hz / rate;

        let mut samples: Vec<f32> = (0..count)
            .map(|i| {
                let progress = i as f32 / count as f32;
                let gain = if volume > 0.0 {
                    volume * (floor / volume).powf(progress)
                } else {
                    0.0
                };
                gain * (step * i as f32).sin()
            })
            .collect();
        if let Some(last) = samples.last_mut() {
            *last = 0.0;
        }
        samples
    }
}

/// Audio output for the confirmation tone.
///
/// Implementations should return quickly; the session plays tones off
/// the scanning thread but does not wait for them.
pub trait ToneSink: Send + Sync {
    /// Plays mono samples at `sample_rate`.
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<(), ToneError>;
}

/// Sink that discards the tone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl ToneSink for SilentSink {
    fn play(&self, _samples: &[f32], _sample_rate: u32) -> Result<(), ToneError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count() {
        let tone = ConfirmationTone::default();
        assert_eq!(tone.samples().len(), 8_820);
    }

    #[test]
    fn test_envelope_decays_to_silence() {
        let samples = ConfirmationTone::default().samples();

        let head = samples[..441].iter().fold(0f32, |m, s| m.max(s.abs()));
        let tail = samples[samples.len() - 441..]
            .iter()
            .fold(0f32, |m, s| m.max(s.abs()));

        assert!(head > 0.25 && head <= 0.3);
        assert!(tail < 0.02);
        assert_eq!(samples.last().copied(), Some(0.0));
    }

    #[test]
    fn test_frequency() {
        // 800 Hz over 200 ms crosses zero about 320 times.
        let samples = ConfirmationTone::default().samples();
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();

        assert!((310..=330).contains(&crossings), "{crossings}");
    }

    #[test]
    fn test_silent_volume() {
        let tone = ConfirmationTone {
            volume: 0.0,
            ..Default::default()
        };
        assert!(tone.samples().iter().all(|&s| s == 0.0));
    }
}
