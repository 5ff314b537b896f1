//! Core types for background removal operations

use crate::error::{BgRemovalError, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Number of bytes per RGBA pixel
pub const CHANNELS: usize = 4;

/// Owned RGBA8 pixel buffer
///
/// The data length always equals `width * height * 4`; every constructor checks
/// this so downstream stages can index without re-validating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a buffer from raw RGBA bytes
    ///
    /// # Errors
    /// - `InvalidBuffer` if `data.len() != width * height * 4`
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = Self::expected_len(width, height)?;
        if data.len() != expected {
            return Err(BgRemovalError::invalid_buffer(format!(
                "{}x{} buffer needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a buffer where every pixel has the same value
    ///
    /// # Errors
    /// - `InvalidBuffer` if the dimensions overflow the address space
    pub fn filled(width: u32, height: u32, pixel: [u8; 4]) -> Result<Self> {
        let expected = Self::expected_len(width, height)?;
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(expected)
            .collect::<Vec<u8>>();
        Self::new(width, height, data)
    }

    /// Build a buffer from row-major pixels
    ///
    /// # Errors
    /// - `InvalidBuffer` if `pixels.len() != width * height`
    pub fn from_pixels(width: u32, height: u32, pixels: &[[u8; 4]]) -> Result<Self> {
        let data = pixels.iter().flatten().copied().collect();
        Self::new(width, height, data)
    }

    fn expected_len(width: u32, height: u32) -> Result<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(CHANNELS))
            .ok_or_else(|| {
                BgRemovalError::invalid_buffer(format!("{}x{} is too large", width, height))
            })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels (`width * height`)
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.data.len() / CHANNELS
    }

    /// Raw RGBA bytes
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return its raw RGBA bytes
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.data
            .get(offset..offset + CHANNELS)
            .and_then(|px| <[u8; 4]>::try_from(px).ok())
    }

    /// Iterate over all pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.data
            .chunks_exact(CHANNELS)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    /// Mutable access to every pixel as a 4-byte slice
    pub fn pixels_mut(&mut self) -> impl Iterator<Item = &mut [u8]> + '_ {
        self.data.chunks_exact_mut(CHANNELS)
    }

    /// Convert into an `image` crate buffer
    ///
    /// # Errors
    /// - `InvalidBuffer` if the data no longer matches the dimensions
    pub fn into_rgba_image(self) -> Result<RgbaImage> {
        let (width, height) = (self.width, self.height);
        RgbaImage::from_raw(width, height, self.data).ok_or_else(|| {
            BgRemovalError::invalid_buffer(format!(
                "Failed to create {}x{} image from pixel data",
                width, height
            ))
        })
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// Per-pixel classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelClass {
    Background,
    Foreground,
}

impl PixelClass {
    #[must_use]
    pub fn is_background(self) -> bool {
        self == Self::Background
    }
}

/// Per-stage pipeline timings in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub mask_ms: u64,
    /// Zero when compositing was skipped
    pub composite_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time not attributed to any stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.decode_ms + self.mask_ms + self.composite_ms + self.encode_ms;
        self.total_ms.saturating_sub(measured)
    }

    /// One-line human readable summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Decode: {}ms | Mask: {}ms | Composite: {}ms | Encode: {}ms",
            self.total_ms, self.decode_ms, self.mask_ms, self.composite_ms, self.encode_ms
        )
    }
}

/// Result of a background removal run
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Masked buffer before compositing, kept for re-rendering against other backgrounds
    pub masked: PixelBuffer,

    /// Encoded PNG bytes of the final (possibly composited) image
    pub png: Vec<u8>,

    /// Stage timings
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.masked.dimensions()
    }

    /// Fraction of pixels made transparent by the mask
    #[must_use]
    pub fn background_ratio(&self) -> f32 {
        let total = self.masked.pixel_count();
        if total == 0 {
            return 0.0;
        }
        let transparent = self.masked.pixels().filter(|px| px[3] == 0).count();
        transparent as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_rejects_length_mismatch() {
        let err = PixelBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidBuffer(_)));
        assert!(err.to_string().contains("16"));

        assert!(PixelBuffer::new(2, 2, vec![0; 16]).is_ok());
        assert!(PixelBuffer::new(0, 0, Vec::new()).is_ok());
    }

    #[test]
    fn test_pixel_access() {
        let buffer = PixelBuffer::from_pixels(
            2,
            1,
            &[[1, 2, 3, 4], [5, 6, 7, 8]],
        )
        .unwrap();

        assert_eq!(buffer.pixel(0, 0), Some([1, 2, 3, 4]));
        assert_eq!(buffer.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(buffer.pixel(2, 0), None);
        assert_eq!(buffer.pixel(0, 1), None);
        assert_eq!(buffer.pixel_count(), 2);
    }

    #[test]
    fn test_filled_and_image_conversion() {
        let buffer = PixelBuffer::filled(3, 2, [9, 8, 7, 6]).unwrap();
        assert_eq!(buffer.as_raw().len(), 24);
        assert!(buffer.pixels().all(|px| px == [9, 8, 7, 6]));

        let image = buffer.clone().into_rgba_image().unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(PixelBuffer::from(image), buffer);
    }

    #[test]
    fn test_timings_overhead() {
        let timings = ProcessingTimings {
            decode_ms: 10,
            mask_ms: 20,
            composite_ms: 0,
            encode_ms: 5,
            total_ms: 40,
        };
        assert_eq!(timings.other_overhead_ms(), 5);
        assert!(timings.summary().starts_with("Total: 40ms"));
    }

    #[test]
    fn test_background_ratio() {
        let masked = PixelBuffer::from_pixels(
            2,
            2,
            &[[0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [255, 0, 0, 255]],
        )
        .unwrap();
        let result = RemovalResult {
            masked,
            png: Vec::new(),
            timings: ProcessingTimings::default(),
        };
        assert!((result.background_ratio() - 0.75).abs() < f32::EPSILON);
    }
}
