//! Scan session lifecycle.
//!
//! ```text
//!            open                acquired             detect
//!   Idle ──────────▶ Initializing ───────▶ Scanning ─────────▶ Detected
//!    ▲                 │   ▲                 │  ▲                │  │
//!    │     acquire     │   │ retry / switch  │  └──── resume ────┘  │
//!    │     failed      ▼   │                 │ stream lost          │
//!    │               Error ◀─────────────────┘                      │
//!    └──────────────────────────── finish ──────────────────────────┘
//!
//!   any state ── close ──▶ Closed (terminal)
//! ```

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Not scanning and holding no camera.
    Idle,
    /// Enumerating devices and acquiring a camera.
    Initializing,
    /// Camera live, frames being analyzed.
    Scanning,
    /// A code was just accepted.
    Detected,
    /// Acquisition or the stream failed; retry or enter a code.
    Error,
    /// Shut down for good.
    Closed,
}

/// Inputs to the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Caller opened the scanner.
    Open,
    /// Caller retried after an error.
    Retry,
    /// A camera stream was acquired.
    Acquired,
    /// Acquisition failed on every ladder step.
    AcquireFailed,
    /// A candidate passed validation and debounce.
    Detect,
    /// Continuous mode: the cooldown after a detection elapsed.
    Resume,
    /// Single-shot mode: the result was delivered.
    Finish,
    /// The live stream failed mid-session.
    StreamLost,
    /// Caller switched to another camera.
    Switch,
    /// Caller closed the session.
    Close,
}

impl SessionEvent {
    /// What the caller was trying to do, for error messages.
    pub fn verb(self) -> &'static str {
        match self {
            SessionEvent::Open => "open",
            SessionEvent::Retry => "retry",
            SessionEvent::Acquired => "start scanning",
            SessionEvent::AcquireFailed => "fail acquisition",
            SessionEvent::Detect => "accept a detection",
            SessionEvent::Resume => "resume scanning",
            SessionEvent::Finish => "finish",
            SessionEvent::StreamLost => "lose the stream",
            SessionEvent::Switch => "switch camera",
            SessionEvent::Close => "close",
        }
    }
}

/// A lifecycle event that is not legal in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no transition from {from} on {event:?}")]
pub struct InvalidTransition {
    /// State the event arrived in.
    pub from: ScanState,
    /// The rejected event.
    pub event: SessionEvent,
}

impl ScanState {
    /// Returns the state `event` leads to.
    pub fn next(self, event: SessionEvent) -> Result<ScanState, InvalidTransition> {
        use ScanState::*;
        use SessionEvent as E;

        let next = match (self, event) {
            (_, E::Close) => Closed,
            (Closed, _) => return Err(InvalidTransition { from: self, event }),
            (Idle, E::Open) => Initializing,
            (Error, E::Retry) => Initializing,
            (Initializing, E::Acquired) => Scanning,
            (Initializing, E::AcquireFailed) => Error,
            (Scanning, E::Detect) => Detected,
            (Detected, E::Resume) => Scanning,
            (Initializing | Detected | Error, E::Finish) => Idle,
            (Scanning | Detected, E::StreamLost) => Error,
            (Scanning | Detected | Error, E::Switch) => Initializing,
            _ => return Err(InvalidTransition { from: self, event }),
        };
        Ok(next)
    }

    /// Lowercase name, as used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Initializing => "initializing",
            ScanState::Scanning => "scanning",
            ScanState::Detected => "detected",
            ScanState::Error => "error",
            ScanState::Closed => "closed",
        }
    }

    /// True in the states where a camera stream is held and sampled.
    pub fn holds_camera(self) -> bool {
        matches!(self, ScanState::Scanning | ScanState::Detected)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ScanState::*;
    use SessionEvent as E;

    #[test]
    fn test_happy_path() {
        let mut state = Idle;
        for event in [E::Open, E::Acquired, E::Detect, E::Finish] {
            state = state.next(event).unwrap();
        }
        assert_eq!(state, Idle);
    }

    #[test]
    fn test_continuous_resume() {
        assert_eq!(Detected.next(E::Resume), Ok(Scanning));
    }

    #[test]
    fn test_error_and_retry() {
        assert_eq!(Initializing.next(E::AcquireFailed), Ok(Error));
        assert_eq!(Scanning.next(E::StreamLost), Ok(Error));
        assert_eq!(Error.next(E::Retry), Ok(Initializing));
    }

    #[test]
    fn test_close_from_anywhere_is_terminal() {
        for state in [Idle, Initializing, Scanning, Detected, Error, Closed] {
            assert_eq!(state.next(E::Close), Ok(Closed));
        }
        assert!(Closed.next(E::Open).is_err());
        assert!(Closed.next(E::Retry).is_err());
    }

    #[test]
    fn test_illegal_events() {
        assert!(Idle.next(E::Detect).is_err());
        assert!(Scanning.next(E::Open).is_err());
        assert!(Initializing.next(E::Switch).is_err());
        assert!(Idle.next(E::Retry).is_err());
    }

    #[test]
    fn test_holds_camera() {
        assert!(Scanning.holds_camera());
        assert!(Detected.holds_camera());
        assert!(!Initializing.holds_camera());
        assert!(!Error.holds_camera());
    }
}
