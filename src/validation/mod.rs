//! Candidate acceptance and duplicate suppression.
//!
//! Every code, whether decoded from a frame or typed by the operator,
//! passes the [`CandidateValidator`]. Decoded codes then pass the
//! [`DebounceGate`] before reaching the caller.

mod debounce;
mod validator;

pub use debounce::DebounceGate;
pub use validator::{gtin_check_digit, CandidateValidator, Rejection};

use serde::{Deserialize, Serialize};

/// Validation rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Require EAN-8/UPC-A check digits and refuse 9-11 digit codes.
    pub strict_short_codes: bool,
}
