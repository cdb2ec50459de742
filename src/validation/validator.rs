//! Acceptance rules for decoded or typed codes.

use super::ValidationConfig;
use crate::decoding::ean13;
use thiserror::Error;

/// Why a candidate was not accepted. Never fatal to a scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Nothing to validate.
    #[error("empty code")]
    Empty,

    /// Not 8 to 13 ASCII digits.
    #[error("`{0}` is not 8 to 13 digits")]
    InvalidFormat(String),

    /// Check digit does not match the rest of the code.
    #[error("check digit {found} does not match computed {expected}")]
    BadChecksum {
        /// Check digit computed from the body.
        expected: u8,
        /// Check digit carried by the code.
        found: u8,
    },

    /// Length refused by strict mode.
    #[error("{0}-digit codes are not accepted in strict mode")]
    UnsupportedLength(usize),
}

/// GTIN-family check digit: weights 3 and 1 alternate from the digit
/// nearest the check position.
pub fn gtin_check_digit(body: &[u8]) -> u8 {
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| u32::from(d) * if i % 2 == 0 { 3 } else { 1 })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Applies length, charset and checksum rules to candidate text.
#[derive(Debug, Clone, Default)]
pub struct CandidateValidator {
    config: ValidationConfig,
}

impl CandidateValidator {
    /// Creates a validator with the given rules.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Accepts `^\d{8,13}$`, verifying the check digit of 13-digit codes.
    ///
    /// Shorter codes pass without a checksum unless strict mode is on, in
    /// which case 8 and 12 digits need valid EAN-8 / UPC-A check digits
    /// and other lengths are refused.
    pub fn validate(&self, raw: &str) -> Result<String, Rejection> {
        if raw.is_empty() {
            return Err(Rejection::Empty);
        }
        let length = raw.len();
        if !(8..=13).contains(&length) || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Rejection::InvalidFormat(raw.to_owned()));
        }

        let digits: Vec<u8> = raw.bytes().map(|b| b - b'0').collect();
        match length {
            13 => {
                if !ean13::is_valid(raw) {
                    return Err(bad_checksum(&digits));
                }
            }
            8 | 12 if self.config.strict_short_codes => {
                if gtin_check_digit(&digits[..length - 1]) != digits[length - 1] {
                    return Err(bad_checksum(&digits));
                }
            }
            _ if self.config.strict_short_codes => {
                return Err(Rejection::UnsupportedLength(length));
            }
            _ => {}
        }

        Ok(raw.to_owned())
    }
}

fn bad_checksum(digits: &[u8]) -> Rejection {
    let (body, check) = digits.split_at(digits.len() - 1);
    Rejection::BadChecksum {
        expected: gtin_check_digit(body),
        found: check[0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn permissive() -> CandidateValidator {
        CandidateValidator::default()
    }

    fn strict() -> CandidateValidator {
        CandidateValidator::new(ValidationConfig {
            strict_short_codes: true,
        })
    }

    #[test]
    fn test_valid_ean13() {
        assert_eq!(permissive().validate("4006381333931").unwrap(), "4006381333931");
    }

    #[test]
    fn test_bad_ean13_checksum() {
        assert_eq!(
            permissive().validate("4006381333932"),
            Err(Rejection::BadChecksum {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn test_arbitrary_thirteen_digits_checked() {
        assert!(matches!(
            permissive().validate("7891234567890"),
            Err(Rejection::BadChecksum { expected: 5, .. })
        ));
    }

    #[test]
    fn test_non_numeric_rejected() {
        assert_eq!(
            permissive().validate("ABC123"),
            Err(Rejection::InvalidFormat("ABC123".into()))
        );
        assert!(permissive().validate("4006381-33931").is_err());
        assert_eq!(permissive().validate(""), Err(Rejection::Empty));
    }

    #[test]
    fn test_length_bounds() {
        assert!(permissive().validate("1234567").is_err());
        assert!(permissive().validate("12345678901234").is_err());
    }

    #[test]
    fn test_short_codes_permissive() {
        for code in ["12345678", "123456789", "1234567890", "12345678901", "123456789012"] {
            assert!(permissive().validate(code).is_ok(), "{code}");
        }
    }

    #[test]
    fn test_strict_short_codes() {
        // EAN-8 96385074 and UPC-A 036000291452 are valid.
        assert!(strict().validate("96385074").is_ok());
        assert!(strict().validate("036000291452").is_ok());
        assert!(strict().validate("96385075").is_err());
        assert_eq!(
            strict().validate("1234567890"),
            Err(Rejection::UnsupportedLength(10))
        );
    }

    #[test]
    fn test_gtin_matches_ean13() {
        let body = [4, 0, 0, 6, 3, 8, 1, 3, 3, 3, 9, 3];
        assert_eq!(gtin_check_digit(&body), ean13::check_digit(&body));
    }

    proptest! {
        #[test]
        fn prop_mutated_ean13_rejected(
            body in proptest::array::uniform12(0u8..10),
            position in 0usize..13,
            delta in 1u8..10,
        ) {
            let mut digits = body.to_vec();
            digits.push(ean13::check_digit(&body));
            digits[position] = (digits[position] + delta) % 10;
            let code: String = digits.iter().map(|d| char::from(b'0' + d)).collect();

            prop_assert!(permissive().validate(&code).is_err());
        }
    }
}
