//! Frame to signal conversion.
//!
//! This module turns a camera frame into 1-D binary signals: a luma
//! scan line thresholded into bars and spaces, and optionally the same
//! signal normalized from pixel runs to barcode modules.

mod modules;
mod scanline;
mod signal;

pub use modules::resample_modules;
pub use scanline::{luma, ExtractorConfig, SignalExtractor};
pub use signal::{BinarySignal, Run};
