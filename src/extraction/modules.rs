//! Pixel-run to module normalization.
//!
//! A camera renders each barcode module across several pixels, and the
//! count varies with distance. This pass anchors on a bar-space-bar
//! start guard, estimates the module width from it, and re-expresses the
//! following runs as whole modules so a module-level decoder can parse
//! them.

use super::{BinarySignal, Run};

/// Widest element in modules for the 1-D symbologies handled here.
const MAX_ELEMENT_MODULES: usize = 4;

/// Guard runs may deviate this much from their mean width.
const GUARD_TOLERANCE: f64 = 0.5;

/// Produces module-level candidates of exactly `modules` bits.
///
/// Candidates come in signal order, one or two per plausible start
/// guard: a first quantization using the guard's module estimate, and a
/// refined one using the width of the whole symbol when it differs.
pub fn resample_modules(signal: &BinarySignal, modules: usize) -> Vec<BinarySignal> {
    let runs = signal.runs();
    let mut candidates = Vec::new();

    for start in 0..runs.len() {
        let Some(module) = guard_module_width(&runs[start..]) else {
            continue;
        };
        let Some((coarse, span_px, span_modules)) = quantize(&runs[start..], module, modules) else {
            continue;
        };
        let refined_module = span_px as f64 / span_modules as f64;
        candidates.push(coarse);

        if let Some((refined, _, _)) = quantize(&runs[start..], refined_module, modules) {
            if candidates.last() != Some(&refined) {
                candidates.push(refined);
            }
        }
    }

    candidates
}

/// Module width implied by a bar-space-bar triple at the head of `runs`.
fn guard_module_width(runs: &[Run]) -> Option<f64> {
    let [bar, space, bar2] = runs.get(..3)? else {
        return None;
    };
    if bar.bit != 1 || space.bit != 0 || bar2.bit != 1 {
        return None;
    }
    let mean = (bar.len + space.len + bar2.len) as f64 / 3.0;
    let within = |len: usize| {
        let len = len as f64;
        len >= mean * (1.0 - GUARD_TOLERANCE) && len <= mean * (1.0 + GUARD_TOLERANCE)
    };
    (within(bar.len) && within(space.len) && within(bar2.len)).then_some(mean)
}

/// Quantizes runs into at most `modules` bits.
///
/// Returns the bits plus the pixel and module spans consumed, or `None`
/// if the runs end before enough modules were produced.
fn quantize(runs: &[Run], module: f64, modules: usize) -> Option<(BinarySignal, usize, usize)> {
    let mut bits = Vec::with_capacity(modules);
    let mut span_px = 0;

    for run in runs {
        let count = ((run.len as f64 / module).round() as usize).clamp(1, MAX_ELEMENT_MODULES);
        bits.extend(std::iter::repeat(run.bit).take(count));
        span_px += run.len;
        if bits.len() >= modules {
            let span_modules = bits.len();
            bits.truncate(modules);
            return Some((BinarySignal::from_bits(bits), span_px, span_modules));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stretch(modules: &str, px: usize) -> BinarySignal {
        let signal = BinarySignal::parse(modules);
        BinarySignal::from_bits(
            signal
                .bits()
                .iter()
                .flat_map(|&b| std::iter::repeat(b).take(px)),
        )
    }

    #[test]
    fn test_recovers_modules_at_integer_scale() {
        let modules = "1010011011000101";
        let pixels = stretch(&format!("0000{modules}0000"), 3);

        let candidates = resample_modules(&pixels, modules.len());
        assert_eq!(candidates.first().map(|c| c.to_string()), Some(modules.to_string()));
    }

    #[test]
    fn test_uneven_guard_rejected() {
        // Bar of 1px, space of 6px, bar of 1px: not a guard.
        let pixels = BinarySignal::parse("01000000101010101010");
        let candidates = resample_modules(&pixels, 5);

        assert!(candidates.iter().all(|c| c.len() == 5));
        assert!(!candidates.iter().any(|c| c.bits().starts_with(&[1, 0, 0, 0, 0])));
    }

    #[test]
    fn test_too_short_gives_nothing() {
        let pixels = stretch("101", 2);
        assert!(resample_modules(&pixels, 95).is_empty());
    }
}
