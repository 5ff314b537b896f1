//! Image decode/encode service
//!
//! Keeps codec concerns out of the pipeline: bytes in, [`PixelBuffer`] out, and
//! back to PNG bytes at the end.

use crate::{
    error::{BgRemovalError, Result},
    types::PixelBuffer,
};
use image::{codecs::png::PngEncoder, ImageEncoder, ImageFormat};
use log::debug;
use std::path::Path;

/// Service for turning raw bytes into pixel buffers and back
pub struct ImageIOService;

impl ImageIOService {
    /// Formats the decoder accepts
    pub const SUPPORTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Png, ImageFormat::Jpeg];

    /// Sniff the container format from magic bytes
    ///
    /// # Errors
    /// - `Decode` if the bytes are empty, unrecognized or not PNG/JPEG
    pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat> {
        if bytes.is_empty() {
            return Err(BgRemovalError::decode("input is empty"));
        }
        let format = image::guess_format(bytes)
            .map_err(|e| BgRemovalError::decode(format!("unrecognized image data: {}", e)))?;
        if !Self::SUPPORTED_FORMATS.contains(&format) {
            return Err(BgRemovalError::decode(format!(
                "unsupported format {:?}; only PNG and JPEG are accepted",
                format
            )));
        }
        Ok(format)
    }

    /// Decode PNG or JPEG bytes into an RGBA8 buffer
    ///
    /// # Examples
    /// ```rust
    /// use bgstrip::services::ImageIOService;
    ///
    /// let err = ImageIOService::decode(b"definitely not an image").unwrap_err();
    /// assert!(err.to_string().contains("decode"));
    /// ```
    ///
    /// # Errors
    /// - `Decode` for unsupported, truncated or corrupt input
    pub fn decode(bytes: &[u8]) -> Result<PixelBuffer> {
        let format = Self::detect_format(bytes)?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| BgRemovalError::decode(format!("{:?} data is corrupt: {}", format, e)))?;
        debug!(
            "Decoded {:?} image {}x{} ({:?})",
            format,
            image.width(),
            image.height(),
            image.color()
        );
        Ok(PixelBuffer::from(image.to_rgba8()))
    }

    /// Encode an RGBA8 buffer as PNG, preserving every channel losslessly
    ///
    /// # Errors
    /// - `Encode` if the PNG encoder rejects the buffer
    pub fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>> {
        let (width, height) = buffer.dimensions();
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(
                buffer.as_raw(),
                width,
                height,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| BgRemovalError::encode(format!("PNG encoding failed: {}", e)))?;
        Ok(out)
    }

    /// Write encoded bytes to disk, creating parent directories as needed
    ///
    /// # Errors
    /// - `Io` if the directory or file cannot be written
    pub fn save_bytes<P: AsRef<Path>>(bytes: &[u8], path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BgRemovalError::file_io_error("create output directory", parent, &e))?;
        }
        std::fs::write(path, bytes)
            .map_err(|e| BgRemovalError::file_io_error("write output file", path, &e))
    }
}
