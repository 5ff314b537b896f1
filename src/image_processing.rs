//! Masking and compositing stages
//!
//! Both stages take ownership of their input buffer and hand back the
//! transformed buffer, so each can be tested on its own and no stage shares
//! pixels with another.

use crate::{
    config::{BackgroundColor, BackgroundFill},
    inference::BackgroundClassifier,
    types::PixelBuffer,
};

/// Zero the alpha channel of every pixel the classifier marks as background
///
/// Foreground pixels are left untouched, background pixels keep their RGB.
/// Output dimensions always equal input dimensions.
#[must_use]
pub fn apply_mask<C: BackgroundClassifier + ?Sized>(
    mut buffer: PixelBuffer,
    classifier: &C,
) -> PixelBuffer {
    for pixel in buffer.pixels_mut() {
        let rgba = [pixel[0], pixel[1], pixel[2], pixel[3]];
        if classifier.classify(rgba).is_background() {
            pixel[3] = 0;
        }
    }
    buffer
}

/// Flatten a masked buffer onto a solid color using source-over blending
///
/// Each output pixel is `src * a + color * (1 - a)` with `a = src_alpha / 255`,
/// rounded to nearest, and fully opaque. An opaque source pixel therefore
/// comes out unchanged and a transparent one comes out exactly `color`.
#[must_use]
pub fn composite_on_color(mut buffer: PixelBuffer, color: BackgroundColor) -> PixelBuffer {
    for pixel in buffer.pixels_mut() {
        let alpha = u32::from(pixel[3]);
        pixel[0] = blend_channel(pixel[0], color.r, alpha);
        pixel[1] = blend_channel(pixel[1], color.g, alpha);
        pixel[2] = blend_channel(pixel[2], color.b, alpha);
        pixel[3] = u8::MAX;
    }
    buffer
}

/// Apply an optional background; `Transparent` returns the buffer as-is
#[must_use]
pub fn apply_background(buffer: PixelBuffer, fill: BackgroundFill) -> PixelBuffer {
    match fill {
        BackgroundFill::Transparent => buffer,
        BackgroundFill::Solid(color) => composite_on_color(buffer, color),
    }
}

fn blend_channel(src: u8, dst: u8, alpha: u32) -> u8 {
    let value = u32::from(src) * alpha + u32::from(dst) * (255 - alpha);
    ((value + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::HeuristicClassifier;

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const RED: [u8; 4] = [255, 0, 0, 255];

    #[test]
    fn test_mask_all_white() {
        let buffer = PixelBuffer::filled(2, 2, WHITE).unwrap();
        let masked = apply_mask(buffer, &HeuristicClassifier::default());

        assert_eq!(masked.dimensions(), (2, 2));
        assert!(masked.pixels().all(|px| px == [255, 255, 255, 0]));
    }

    #[test]
    fn test_mask_keeps_foreground_untouched() {
        let buffer = PixelBuffer::from_pixels(2, 2, &[RED, WHITE, WHITE, WHITE]).unwrap();
        let masked = apply_mask(buffer, &HeuristicClassifier::default());

        assert_eq!(masked.pixel(0, 0), Some(RED));
        assert_eq!(masked.pixel(1, 0), Some([255, 255, 255, 0]));
        assert_eq!(masked.pixel(0, 1), Some([255, 255, 255, 0]));
        assert_eq!(masked.pixel(1, 1), Some([255, 255, 255, 0]));
    }

    #[test]
    fn test_mask_preserves_partial_alpha_of_foreground() {
        let buffer = PixelBuffer::from_pixels(1, 1, &[[200, 30, 60, 77]]).unwrap();
        let masked = apply_mask(buffer, &HeuristicClassifier::default());
        assert_eq!(masked.pixel(0, 0), Some([200, 30, 60, 77]));
    }

    #[test]
    fn test_mask_is_deterministic() {
        let pixels: Vec<[u8; 4]> = (0..64u8)
            .map(|i| [i.wrapping_mul(37), i.wrapping_mul(91), i.wrapping_mul(13), 255])
            .collect();
        let buffer = PixelBuffer::from_pixels(8, 8, &pixels).unwrap();
        let first = apply_mask(buffer.clone(), &HeuristicClassifier::default());
        let second = apply_mask(buffer, &HeuristicClassifier::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_composite_extremes() {
        let blue = BackgroundColor::new(0x3b, 0x82, 0xf6);
        let buffer =
            PixelBuffer::from_pixels(2, 1, &[[10, 20, 30, 255], [10, 20, 30, 0]]).unwrap();
        let flat = composite_on_color(buffer, blue);

        assert_eq!(flat.pixel(0, 0), Some([10, 20, 30, 255]));
        assert_eq!(flat.pixel(1, 0), Some([0x3b, 0x82, 0xf6, 255]));
    }

    #[test]
    fn test_composite_half_alpha() {
        let buffer = PixelBuffer::from_pixels(1, 1, &[[255, 0, 0, 128]]).unwrap();
        let flat = composite_on_color(buffer, BackgroundColor::black());
        // 255 * 128 / 255 = 128
        assert_eq!(flat.pixel(0, 0), Some([128, 0, 0, 255]));
    }

    #[test]
    fn test_apply_background_transparent_is_identity() {
        let buffer = PixelBuffer::from_pixels(1, 2, &[[1, 2, 3, 0], RED]).unwrap();
        let out = apply_background(buffer.clone(), BackgroundFill::Transparent);
        assert_eq!(out, buffer);

        let out = apply_background(buffer, BackgroundFill::Solid(BackgroundColor::white()));
        assert_eq!(out.pixel(0, 0), Some(WHITE));
        assert_eq!(out.pixel(0, 1), Some(RED));
    }
}
