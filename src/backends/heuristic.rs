//! Luminance / color-uniformity background heuristic
//!
//! This is a deliberately crude stand-in for a real matting model. It marks
//! bright pixels and near-gray pixels as background and everything else as
//! foreground. It will happily erase a gray shirt and keep a saturated
//! backdrop; swap in a proper [`BackgroundClassifier`] for real segmentation.

use crate::{config::ClassifierConfig, inference::BackgroundClassifier, types::PixelClass};

/// Threshold-based classifier working on RGB only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeuristicClassifier {
    config: ClassifierConfig,
}

impl HeuristicClassifier {
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// True when the channel average is strictly above the threshold
    ///
    /// Compared as `R + G + B > 3 * threshold`, which matches the exact
    /// (fractional) average without rounding: a sum of 601 averages 200.33.
    #[must_use]
    pub fn is_bright(&self, r: u8, g: u8, b: u8) -> bool {
        let sum = u16::from(r) + u16::from(g) + u16::from(b);
        sum > 3 * u16::from(self.config.brightness_threshold)
    }

    /// True when every pairwise channel difference is below the tolerance
    #[must_use]
    pub fn is_uniform(&self, r: u8, g: u8, b: u8) -> bool {
        let tolerance = self.config.channel_tolerance;
        r.abs_diff(g) < tolerance && g.abs_diff(b) < tolerance && r.abs_diff(b) < tolerance
    }
}

impl BackgroundClassifier for HeuristicClassifier {
    fn classify(&self, pixel: [u8; 4]) -> PixelClass {
        // Alpha is ignored: an already-transparent pixel is judged by its RGB.
        let [r, g, b, _] = pixel;
        if self.is_bright(r, g, b) || self.is_uniform(r, g, b) {
            PixelClass::Background
        } else {
            PixelClass::Foreground
        }
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> HeuristicClassifier {
        HeuristicClassifier::default()
    }

    #[test]
    fn test_bright_pixels_are_background() {
        assert_eq!(
            classifier().classify([255, 255, 255, 255]),
            PixelClass::Background
        );
        // brightness 201 with a wide spread is still background
        assert_eq!(
            classifier().classify([255, 255, 93, 255]),
            PixelClass::Background
        );
    }

    #[test]
    fn test_brightness_threshold_is_exclusive() {
        // (255 + 255 + 90) / 3 = 200, not > 200, and the spread is wide
        assert!(!classifier().is_bright(255, 255, 90));
        assert_eq!(
            classifier().classify([255, 255, 90, 255]),
            PixelClass::Foreground
        );
    }

    #[test]
    fn test_fractional_brightness_above_threshold_is_background() {
        // (255 + 255 + 91) / 3 = 200.33; truncating to 200 would keep it
        assert!(classifier().is_bright(255, 255, 91));
        assert_eq!(
            classifier().classify([255, 255, 91, 255]),
            PixelClass::Background
        );
        assert_eq!(
            classifier().classify([255, 255, 92, 255]),
            PixelClass::Background
        );
    }

    #[test]
    fn test_gray_pixels_are_background() {
        assert_eq!(classifier().classify([0, 0, 0, 255]), PixelClass::Background);
        assert_eq!(
            classifier().classify([100, 120, 110, 255]),
            PixelClass::Background
        );
    }

    #[test]
    fn test_channel_tolerance_is_exclusive() {
        // |R-G| == 30 is not < 30
        assert_eq!(
            classifier().classify([130, 100, 110, 255]),
            PixelClass::Foreground
        );
        assert_eq!(
            classifier().classify([129, 100, 110, 255]),
            PixelClass::Background
        );
    }

    #[test]
    fn test_saturated_pixels_are_foreground() {
        assert_eq!(classifier().classify([255, 0, 0, 255]), PixelClass::Foreground);
        assert_eq!(classifier().classify([16, 185, 129, 255]), PixelClass::Foreground);
    }

    #[test]
    fn test_alpha_is_ignored() {
        for alpha in [0, 1, 128, 255] {
            assert_eq!(
                classifier().classify([255, 0, 0, alpha]),
                PixelClass::Foreground
            );
            assert_eq!(
                classifier().classify([250, 250, 250, alpha]),
                PixelClass::Background
            );
        }
    }

    #[test]
    fn test_custom_thresholds() {
        let strict = HeuristicClassifier::new(ClassifierConfig {
            brightness_threshold: 254,
            channel_tolerance: 0,
        });
        // nothing is < 0, so only brightness can mark background
        assert_eq!(strict.classify([128, 128, 128, 255]), PixelClass::Foreground);
        assert_eq!(strict.classify([255, 255, 255, 255]), PixelClass::Background);
    }

    #[test]
    fn test_classification_is_order_independent() {
        let c = classifier();
        let colors = [[12, 200, 40, 255], [250, 250, 250, 0], [90, 90, 95, 255]];
        let forward: Vec<_> = colors.iter().map(|px| c.classify(*px)).collect();
        let backward: Vec<_> = colors.iter().rev().map(|px| c.classify(*px)).collect();
        assert_eq!(forward, backward.into_iter().rev().collect::<Vec<_>>());
    }
}
