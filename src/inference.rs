//! Background classifier abstraction
//!
//! The pipeline only needs a per-pixel decision. Anything that can answer
//! "is this pixel background?" from its color alone plugs in here, including
//! a future learned segmentation model wrapped behind the same call.

use crate::types::PixelClass;

/// Decides whether a single RGBA pixel belongs to the background
///
/// Implementations must be pure functions of the pixel value: no position, no
/// shared mutable state, identical output for identical input. The masking
/// engine relies on this to stay deterministic.
pub trait BackgroundClassifier: Send + Sync + std::fmt::Debug {
    /// Classify one pixel
    fn classify(&self, pixel: [u8; 4]) -> PixelClass;

    /// Short name used in logs and timings
    fn name(&self) -> &'static str;
}

impl<T: BackgroundClassifier + ?Sized> BackgroundClassifier for Box<T> {
    fn classify(&self, pixel: [u8; 4]) -> PixelClass {
        (**self).classify(pixel)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: BackgroundClassifier + ?Sized> BackgroundClassifier for std::sync::Arc<T> {
    fn classify(&self, pixel: [u8; 4]) -> PixelClass {
        (**self).classify(pixel)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
