//! EAN-13 bit-pattern grammar.
//!
//! Layout of the 95 modules:
//!
//! ```text
//! | 101 | 6 x 7 left (L/G) | 01010 | 6 x 7 right (R) | 101 |
//!   0-2        3-44           45-49        50-91       92-94
//! ```
//!
//! The parity pattern (L or G) of the six left digits encodes the
//! leading digit, which is never drawn directly.

use super::{BarcodeCandidate, BarcodeFormat};
use crate::extraction::BinarySignal;

/// Modules in a complete EAN-13 symbol.
pub const SYMBOL_MODULES: usize = 95;

const START_GUARD: [u8; 3] = [1, 0, 1];
const CENTER_GUARD: [u8; 5] = [0, 1, 0, 1, 0];
const END_GUARD: [u8; 3] = [1, 0, 1];
const CENTER_OFFSET: usize = 45;
const LEFT_OFFSET: usize = 3;
const RIGHT_OFFSET: usize = 50;
const DIGIT_MODULES: usize = 7;

/// Left-hand odd parity patterns, indexed by digit.
const L_PATTERNS: [[u8; 7]; 10] = [
    [0, 0, 0, 1, 1, 0, 1],
    [0, 0, 1, 1, 0, 0, 1],
    [0, 0, 1, 0, 0, 1, 1],
    [0, 1, 1, 1, 1, 0, 1],
    [0, 1, 0, 0, 0, 1, 1],
    [0, 1, 1, 0, 0, 0, 1],
    [0, 1, 0, 1, 1, 1, 1],
    [0, 1, 1, 1, 0, 1, 1],
    [0, 1, 1, 0, 1, 1, 1],
    [0, 0, 0, 1, 0, 1, 1],
];

/// Left-hand even parity patterns, indexed by digit.
const G_PATTERNS: [[u8; 7]; 10] = [
    [0, 1, 0, 0, 1, 1, 1],
    [0, 1, 1, 0, 0, 1, 1],
    [0, 0, 1, 1, 0, 1, 1],
    [0, 1, 0, 0, 0, 0, 1],
    [0, 0, 1, 1, 1, 0, 1],
    [0, 1, 1, 1, 0, 0, 1],
    [0, 0, 0, 0, 1, 0, 1],
    [0, 0, 1, 0, 0, 0, 1],
    [0, 0, 0, 1, 0, 0, 1],
    [0, 0, 1, 0, 1, 1, 1],
];

/// Right-hand patterns, indexed by digit.
const R_PATTERNS: [[u8; 7]; 10] = [
    [1, 1, 1, 0, 0, 1, 0],
    [1, 1, 0, 0, 1, 1, 0],
    [1, 1, 0, 1, 1, 0, 0],
    [1, 0, 0, 0, 0, 1, 0],
    [1, 0, 1, 1, 1, 0, 0],
    [1, 0, 0, 1, 1, 1, 0],
    [1, 0, 1, 0, 0, 0, 0],
    [1, 0, 0, 0, 1, 0, 0],
    [1, 0, 0, 1, 0, 0, 0],
    [1, 1, 1, 0, 1, 0, 0],
];

/// Left-half parity signature for each leading digit.
const FIRST_DIGIT_SIGNATURES: [&str; 10] = [
    "LLLLLL", "LLGLGG", "LLGGLG", "LLGGGL", "LGLLGG", "LGGLLG", "LGGGLL", "LGLGLG", "LGLGGL",
    "LGGLGL",
];

/// EAN-13 check digit for the first twelve digits.
///
/// Digits at even positions weigh 1, odd positions weigh 3.
pub fn check_digit(digits: &[u8; 12]) -> u8 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| u32::from(d) * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// True when `code` is 13 ASCII digits with a matching check digit.
pub fn is_valid(code: &str) -> bool {
    let Some(digits) = parse_digits::<13>(code) else {
        return false;
    };
    let mut body = [0u8; 12];
    body.copy_from_slice(&digits[..12]);
    check_digit(&body) == digits[12]
}

pub(crate) fn parse_digits<const N: usize>(code: &str) -> Option<[u8; N]> {
    let bytes = code.as_bytes();
    if bytes.len() != N || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let mut digits = [0u8; N];
    for (slot, b) in digits.iter_mut().zip(bytes) {
        *slot = b - b'0';
    }
    Some(digits)
}

/// Renders a valid 13-digit code as its 95 module bits.
///
/// Returns `None` when the input is not a checksum-valid EAN-13 code.
pub fn encode(code: &str) -> Option<Vec<u8>> {
    if !is_valid(code) {
        return None;
    }
    let digits = parse_digits::<13>(code)?;
    let signature = FIRST_DIGIT_SIGNATURES[usize::from(digits[0])].as_bytes();

    let mut modules = Vec::with_capacity(SYMBOL_MODULES);
    modules.extend_from_slice(&START_GUARD);
    for (i, &digit) in digits[1..7].iter().enumerate() {
        let table = if signature[i] == b'L' { &L_PATTERNS } else { &G_PATTERNS };
        modules.extend_from_slice(&table[usize::from(digit)]);
    }
    modules.extend_from_slice(&CENTER_GUARD);
    for &digit in &digits[7..] {
        modules.extend_from_slice(&R_PATTERNS[usize::from(digit)]);
    }
    modules.extend_from_slice(&END_GUARD);
    Some(modules)
}

/// Parses module-level binary signals into EAN-13 codes.
///
/// Stateless: the same signal always gives the same result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ean13Decoder;

impl Ean13Decoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self
    }

    /// Decodes the first complete, checksum-valid symbol in `signal`.
    ///
    /// Every occurrence of the `101` start guard is tried in order.
    pub fn decode(&self, signal: &BinarySignal) -> Option<BarcodeCandidate> {
        let bits = signal.bits();
        if bits.len() < SYMBOL_MODULES {
            return None;
        }
        (0..=bits.len() - SYMBOL_MODULES)
            .filter(|&start| bits[start..start + START_GUARD.len()] == START_GUARD)
            .find_map(|start| decode_symbol(&bits[start..start + SYMBOL_MODULES]))
            .map(|text| BarcodeCandidate::new(text, BarcodeFormat::Ean13))
    }
}

/// Decodes exactly 95 modules starting at the start guard.
fn decode_symbol(symbol: &[u8]) -> Option<String> {
    if symbol[..3] != START_GUARD
        || symbol[CENTER_OFFSET..CENTER_OFFSET + 5] != CENTER_GUARD
        || symbol[SYMBOL_MODULES - 3..] != END_GUARD
    {
        return None;
    }

    let mut digits = [0u8; 13];
    let mut signature = [b'L'; 6];

    for i in 0..6 {
        let group = digit_group(symbol, LEFT_OFFSET + i * DIGIT_MODULES);
        if let Some(d) = lookup(&L_PATTERNS, group) {
            digits[i + 1] = d;
        } else if let Some(d) = lookup(&G_PATTERNS, group) {
            digits[i + 1] = d;
            signature[i] = b'G';
        } else {
            return None;
        }
    }

    for i in 0..6 {
        let group = digit_group(symbol, RIGHT_OFFSET + i * DIGIT_MODULES);
        digits[i + 7] = lookup(&R_PATTERNS, group)?;
    }

    let first = FIRST_DIGIT_SIGNATURES
        .iter()
        .position(|sig| sig.as_bytes() == signature)?;
    digits[0] = first as u8;

    let mut body = [0u8; 12];
    body.copy_from_slice(&digits[..12]);
    if check_digit(&body) != digits[12] {
        return None;
    }

    Some(digits.iter().map(|d| char::from(b'0' + d)).collect())
}

fn digit_group(symbol: &[u8], offset: usize) -> &[u8] {
    &symbol[offset..offset + DIGIT_MODULES]
}

fn lookup(table: &[[u8; 7]; 10], group: &[u8]) -> Option<u8> {
    table.iter().position(|p| p[..] == *group).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signal_for(code: &str) -> BinarySignal {
        BinarySignal::from_bits(encode(code).unwrap())
    }

    fn with_margins(code: &str) -> BinarySignal {
        let mut bits = vec![0u8; 11];
        bits.extend(encode(code).unwrap());
        bits.extend([0u8; 7]);
        BinarySignal::from_bits(bits)
    }

    #[test]
    fn test_known_check_digit() {
        assert_eq!(check_digit(&[4, 0, 0, 6, 3, 8, 1, 3, 3, 3, 9, 3]), 1);
        assert!(is_valid("4006381333931"));
        assert!(!is_valid("4006381333932"));
    }

    #[test]
    fn test_arbitrary_code_is_checked_not_trusted() {
        // 7+9+2+4+6+8 + 3*(8+1+3+5+7+9) = 135, so the check digit is 5.
        assert!(!is_valid("7891234567890"));
        assert!(is_valid("7891234567895"));
    }

    #[test]
    fn test_decode_known_vector() {
        let candidate = Ean13Decoder::new().decode(&with_margins("4006381333931")).unwrap();
        assert_eq!(candidate.text, "4006381333931");
        assert_eq!(candidate.format, BarcodeFormat::Ean13);
    }

    #[test]
    fn test_every_leading_digit() {
        for first in 0..10u8 {
            let body = [first, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1];
            let code: String = body
                .iter()
                .chain(std::iter::once(&check_digit(&body)))
                .map(|d| char::from(b'0' + d))
                .collect();

            let decoded = Ean13Decoder::new().decode(&signal_for(&code)).unwrap();
            assert_eq!(decoded.text, code);
        }
    }

    #[test]
    fn test_no_start_guard() {
        let signal = BinarySignal::from_bits(vec![0u8; 200]);
        assert!(Ean13Decoder::new().decode(&signal).is_none());
    }

    #[test]
    fn test_too_few_bits_after_guard() {
        let bits = encode("4006381333931").unwrap();
        let signal = BinarySignal::from_bits(bits[..94].to_vec());
        assert!(Ean13Decoder::new().decode(&signal).is_none());
    }

    #[test]
    fn test_broken_center_guard() {
        let mut bits = encode("4006381333931").unwrap();
        bits[47] ^= 1;
        assert!(Ean13Decoder::new().decode(&BinarySignal::from_bits(bits)).is_none());
    }

    #[test]
    fn test_broken_end_guard() {
        let mut bits = encode("4006381333931").unwrap();
        bits[94] = 0;
        assert!(Ean13Decoder::new().decode(&BinarySignal::from_bits(bits)).is_none());
    }

    #[test]
    fn test_unknown_digit_pattern() {
        let mut bits = encode("4006381333931").unwrap();
        // 1111111 is in none of the tables.
        bits[LEFT_OFFSET..LEFT_OFFSET + 7].copy_from_slice(&[1; 7]);
        assert!(Ean13Decoder::new().decode(&BinarySignal::from_bits(bits)).is_none());
    }

    #[test]
    fn test_unmatched_parity_signature() {
        let mut bits = encode("0000000000000").unwrap();
        // Swap the first left digit from L to G: signature GLLLLL is not legal.
        bits[LEFT_OFFSET..LEFT_OFFSET + 7].copy_from_slice(&G_PATTERNS[0]);
        assert!(Ean13Decoder::new().decode(&BinarySignal::from_bits(bits)).is_none());
    }

    #[test]
    fn test_bad_checksum_in_bits() {
        let mut bits = encode("4006381333931").unwrap();
        // Redraw the final digit as 2.
        bits[RIGHT_OFFSET + 35..RIGHT_OFFSET + 42].copy_from_slice(&R_PATTERNS[2]);
        assert!(Ean13Decoder::new().decode(&BinarySignal::from_bits(bits)).is_none());
    }

    #[test]
    fn test_skips_false_start_guard() {
        let mut bits = vec![1, 0, 1, 1, 0, 0];
        bits.extend(encode("5901234123457").unwrap());
        bits.extend([0u8; 4]);

        let decoded = Ean13Decoder::new().decode(&BinarySignal::from_bits(bits)).unwrap();
        assert_eq!(decoded.text, "5901234123457");
    }

    #[test]
    fn test_encode_rejects_bad_checksum() {
        assert!(encode("4006381333932").is_none());
        assert!(encode("12345").is_none());
        assert_eq!(encode("4006381333931").map(|m| m.len()), Some(SYMBOL_MODULES));
    }

    proptest! {
        #[test]
        fn prop_check_digit_round_trip(body in proptest::array::uniform12(0u8..10)) {
            let code: String = body
                .iter()
                .chain(std::iter::once(&check_digit(&body)))
                .map(|d| char::from(b'0' + d))
                .collect();

            let decoded = Ean13Decoder::new().decode(&signal_for(&code));
            prop_assert_eq!(decoded.map(|c| c.text), Some(code));
        }

        #[test]
        fn prop_single_digit_mutation_invalidates(
            body in proptest::array::uniform12(0u8..10),
            position in 0usize..13,
            delta in 1u8..10,
        ) {
            let mut digits: Vec<u8> = body.to_vec();
            digits.push(check_digit(&body));
            digits[position] = (digits[position] + delta) % 10;
            let mutated: String = digits.iter().map(|d| char::from(b'0' + d)).collect();

            prop_assert!(!is_valid(&mutated));
        }
    }
}
