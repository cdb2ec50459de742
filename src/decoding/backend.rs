//! Concrete decode backends.

use super::ean13::{self, Ean13Decoder};
use super::{BarcodeCandidate, DecodeBackend, DecoderFault};
use crate::capture::FrameSample;
use crate::extraction::{resample_modules, SignalExtractor};

/// An EAN-13 symbol has 30 bars, so a line crossing one has at least
/// 59 transitions.
const MIN_SYMBOL_TRANSITIONS: usize = 59;

/// Native EAN-13 backend: scan lines, then the bit grammar.
///
/// Each configured scan line is tried as-is (one pixel per module) and
/// then after run-length normalization to modules.
#[derive(Debug, Clone, Default)]
pub struct Ean13Backend {
    extractor: SignalExtractor,
    decoder: Ean13Decoder,
}

impl Ean13Backend {
    /// Creates a backend that extracts signals with `extractor`.
    pub fn new(extractor: SignalExtractor) -> Self {
        Self {
            extractor,
            decoder: Ean13Decoder::new(),
        }
    }
}

impl DecodeBackend for Ean13Backend {
    fn name(&self) -> &str {
        "ean13"
    }

    fn decode(&self, frame: &FrameSample) -> Result<Option<BarcodeCandidate>, DecoderFault> {
        if !frame.is_valid() {
            return Err(DecoderFault::new(
                self.name(),
                format!(
                    "pixel buffer of {} bytes does not match {}x{} {:?}",
                    frame.pixels().len(),
                    frame.width(),
                    frame.height(),
                    frame.format()
                ),
            ));
        }

        for signal in self.extractor.extract_lines(frame) {
            if signal.transitions() < MIN_SYMBOL_TRANSITIONS {
                continue;
            }
            if let Some(candidate) = self.decoder.decode(&signal) {
                return Ok(Some(candidate));
            }
            let found = resample_modules(&signal, ean13::SYMBOL_MODULES)
                .iter()
                .find_map(|modules| self.decoder.decode(modules));
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

type ExternalDecodeFn =
    dyn Fn(&FrameSample) -> Result<Option<BarcodeCandidate>, String> + Send + Sync;

/// Adapter for a host-provided multi-symbology decoder.
///
/// The closure receives the raw frame and reports either a candidate,
/// nothing, or an error message which is surfaced as a [`DecoderFault`].
pub struct ExternalBackend {
    name: String,
    decode_fn: Box<ExternalDecodeFn>,
}

impl ExternalBackend {
    /// Wraps `decode_fn` under `name`.
    pub fn new<F>(name: impl Into<String>, decode_fn: F) -> Self
    where
        F: Fn(&FrameSample) -> Result<Option<BarcodeCandidate>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            decode_fn: Box::new(decode_fn),
        }
    }
}

impl DecodeBackend for ExternalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, frame: &FrameSample) -> Result<Option<BarcodeCandidate>, DecoderFault> {
        (self.decode_fn)(frame).map_err(|message| DecoderFault::new(&self.name, message))
    }
}

impl std::fmt::Debug for ExternalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalBackend")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use crate::decoding::BarcodeFormat;

    /// Draws `code` across a gray frame with `module_px` pixels per module.
    fn render(code: &str, module_px: usize, width: usize, height: usize) -> FrameSample {
        let modules = ean13::encode(code).unwrap();
        let start = (width - modules.len() * module_px) / 2;
        let mut row = vec![230u8; width];
        for (i, &bit) in modules.iter().enumerate() {
            if bit == 1 {
                for px in 0..module_px {
                    row[start + i * module_px + px] = 20;
                }
            }
        }
        let pixels = row.iter().copied().cycle().take(width * height).collect();
        FrameSample::gray(pixels, width as u32, height as u32, 1)
    }

    #[test]
    fn test_decodes_one_pixel_modules() {
        let backend = Ean13Backend::default();
        let frame = render("4006381333931", 1, 160, 8);

        let candidate = backend.decode(&frame).unwrap().unwrap();
        assert_eq!(candidate.text, "4006381333931");
    }

    #[test]
    fn test_decodes_scaled_modules() {
        let backend = Ean13Backend::default();
        let frame = render("5901234123457", 3, 400, 8);

        let candidate = backend.decode(&frame).unwrap().unwrap();
        assert_eq!(candidate.text, "5901234123457");
        assert_eq!(candidate.format, BarcodeFormat::Ean13);
    }

    #[test]
    fn test_blank_frame_has_no_candidate() {
        let backend = Ean13Backend::default();
        let frame = FrameSample::gray(vec![240; 64 * 8], 64, 8, 1);

        assert_eq!(backend.decode(&frame).unwrap(), None);
    }

    #[test]
    fn test_malformed_frame_is_fault() {
        let backend = Ean13Backend::default();
        let frame = FrameSample::new(vec![0; 10], 64, 8, PixelFormat::Rgb8, 1);

        assert!(backend.decode(&frame).is_err());
    }

    #[test]
    fn test_external_backend() {
        let ok = ExternalBackend::new("code128", |_| {
            Ok(Some(BarcodeCandidate::new("12345678", BarcodeFormat::Code128)))
        });
        let failing = ExternalBackend::new("broken", |_| Err("no luminance".to_string()));
        let frame = FrameSample::gray(vec![0; 4], 2, 2, 1);

        assert_eq!(ok.decode(&frame).unwrap().unwrap().text, "12345678");
        let fault = failing.decode(&frame).unwrap_err();
        assert_eq!(fault.backend, "broken");
    }
}
