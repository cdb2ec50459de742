//! Duplicate suppression for a barcode held in front of the camera.

use std::time::{Duration, Instant};

/// Rejects a code seen again within the cooldown window.
///
/// Only admissions move the window; a rejected repeat does not extend it.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl DebounceGate {
    /// Creates a gate with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    /// Returns the cooldown window.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Last admitted code and when it was admitted.
    pub fn last(&self) -> Option<(&str, Instant)> {
        self.last.as_ref().map(|(code, at)| (code.as_str(), *at))
    }

    /// Returns `true` and records the code unless it repeats the last
    /// admitted one within the cooldown.
    pub fn admit(&mut self, code: &str, now: Instant) -> bool {
        if let Some((last_code, at)) = &self.last {
            if last_code == code && now.saturating_duration_since(*at) < self.cooldown {
                tracing::trace!(code, "Debounced repeat detection");
                return false;
            }
        }
        self.last = Some((code.to_owned(), now));
        true
    }

    /// Records a code accepted outside the gate, such as manual entry,
    /// so the camera does not report it again within the cooldown.
    pub fn record(&mut self, code: &str, now: Instant) {
        self.last = Some((code.to_owned(), now));
    }

    /// Forgets the last admission.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
