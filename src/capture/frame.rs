//! Frame snapshot taken from a live camera stream.

use std::time::Instant;

/// Pixel layout of a [`FrameSample`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte per pixel, already luminance.
    Gray8,
    /// Three bytes per pixel, R G B.
    Rgb8,
    /// Four bytes per pixel, R G B A (what browser canvases hand out).
    Rgba8,
}

impl PixelFormat {
    /// Bytes used by one pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// An immutable snapshot of one video frame.
///
/// Owned by the sampling step that produced it and dropped after a
/// single decode attempt. Nothing in the engine caches frames.
pub struct FrameSample {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    timestamp: Instant,
    sequence: u64,
}

impl FrameSample {
    /// Creates a new frame with the given parameters.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            format,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Convenience constructor for grayscale frames.
    pub fn gray(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self::new(pixels, width, height, PixelFormat::Gray8, sequence)
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixel layout.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the sequence number assigned by the stream.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True when either dimension is zero (stream not ready yet).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates that the pixel buffer size matches dimensions and format.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.pixel_count() * self.format.bytes_per_pixel()
    }

    /// Returns one row of raw bytes, or `None` when out of range or the
    /// buffer is short.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height || self.width == 0 {
            return None;
        }
        let stride = self.width as usize * self.format.bytes_per_pixel();
        let start = y as usize * stride;
        self.pixels.get(start..start + stride)
    }

    /// Content fingerprint used to recognise repeated frames.
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.width.to_le_bytes());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(&self.pixels);
        hasher.finalize()
    }
}

impl std::fmt::Debug for FrameSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSample")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = FrameSample::new(vec![0u8; 64 * 48 * 4], 64, 48, PixelFormat::Rgba8, 1);

        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.sequence(), 1);
        assert!(frame.is_valid());
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_frame_invalid_size() {
        let frame = FrameSample::new(vec![0u8; 100], 64, 48, PixelFormat::Rgb8, 1);
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_zero_dimension_is_empty() {
        let frame = FrameSample::gray(Vec::new(), 0, 480, 1);
        assert!(frame.is_empty());
        assert!(frame.row(0).is_none());
        assert!(frame.row(479).is_none());

        let flat = FrameSample::gray(Vec::new(), 640, 0, 2);
        assert!(flat.is_empty());
        assert!(flat.row(0).is_none());
    }

    #[test]
    fn test_row_slicing() {
        let pixels: Vec<u8> = (0..12).collect();
        let frame = FrameSample::gray(pixels, 4, 3, 1);

        assert_eq!(frame.row(1), Some(&[4u8, 5, 6, 7][..]));
        assert!(frame.row(3).is_none());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = FrameSample::gray(vec![1u8; 16], 4, 4, 1);
        let b = FrameSample::gray(vec![1u8; 16], 4, 4, 2);
        let c = FrameSample::gray(vec![2u8; 16], 4, 4, 3);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
