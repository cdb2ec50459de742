//! Binarized scan-line signal.

/// Ordered sequence of bits taken from one scan line.
///
/// `1` marks a dark (bar) sample and `0` a light (space) sample.
/// Transient: produced per frame and consumed by a decoder right away.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BinarySignal {
    bits: Vec<u8>,
}

/// A maximal stretch of equal bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// The bit value of the stretch.
    pub bit: u8,
    /// Number of samples in the stretch.
    pub len: usize,
}

impl BinarySignal {
    /// Wraps bits. Any non-zero value is treated as `1`.
    pub fn from_bits(bits: impl IntoIterator<Item = u8>) -> Self {
        Self {
            bits: bits.into_iter().map(|b| u8::from(b != 0)).collect(),
        }
    }

    /// Parses a `"0101..."` string, ignoring any other character.
    pub fn parse(text: &str) -> Self {
        Self::from_bits(text.chars().filter_map(|c| match c {
            '0' => Some(0),
            '1' => Some(1),
            _ => None,
        }))
    }

    /// The bits.
    #[inline]
    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True when there are no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Run-length encoding of the signal.
    pub fn runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = Vec::new();
        for &bit in &self.bits {
            match runs.last_mut() {
                Some(run) if run.bit == bit => run.len += 1,
                _ => runs.push(Run { bit, len: 1 }),
            }
        }
        runs
    }

    /// Number of bar/space transitions.
    pub fn transitions(&self) -> usize {
        self.bits.windows(2).filter(|w| w[0] != w[1]).count()
    }
}

impl std::fmt::Debug for BinarySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinarySignal")
            .field("len", &self.bits.len())
            .field("transitions", &self.transitions())
            .finish()
    }
}

impl std::fmt::Display for BinarySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &bit in &self.bits {
            f.write_str(if bit == 1 { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let signal = BinarySignal::parse("10 1100");
        assert_eq!(signal.len(), 6);
        assert_eq!(signal.to_string(), "101100");
    }

    #[test]
    fn test_runs() {
        let signal = BinarySignal::parse("0011101");
        assert_eq!(
            signal.runs(),
            vec![
                Run { bit: 0, len: 2 },
                Run { bit: 1, len: 3 },
                Run { bit: 0, len: 1 },
                Run { bit: 1, len: 1 },
            ]
        );
        assert_eq!(signal.transitions(), 3);
    }

    #[test]
    fn test_empty() {
        let signal = BinarySignal::default();
        assert!(signal.is_empty());
        assert!(signal.runs().is_empty());
    }
}
