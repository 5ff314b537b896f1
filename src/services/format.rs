//! Output naming and MIME handling
//!
//! Results are always PNG so the alpha channel survives; this module only has
//! to agree with downstream consumers on names and content types.

use std::path::Path;

/// Service for output naming and MIME type mapping
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Suffix appended to the original stem
    pub const OUTPUT_SUFFIX: &'static str = "_no_bg";

    /// Stem used when the upload had no usable name
    pub const FALLBACK_STEM: &'static str = "image";

    /// MIME type of every result
    pub const OUTPUT_MIME: &'static str = "image/png";

    /// File name for a processed result: `<original-stem>_no_bg.png`
    ///
    /// The stem is everything before the first `.` of the file name.
    ///
    /// # Examples
    /// ```rust
    /// use bgstrip::services::OutputFormatHandler;
    ///
    /// assert_eq!(OutputFormatHandler::output_file_name(Some("cat.jpg")), "cat_no_bg.png");
    /// assert_eq!(OutputFormatHandler::output_file_name(Some("a.b.png")), "a_no_bg.png");
    /// assert_eq!(OutputFormatHandler::output_file_name(None), "image_no_bg.png");
    /// ```
    #[must_use]
    pub fn output_file_name(original: Option<&str>) -> String {
        format!("{}{}.png", Self::stem(original), Self::OUTPUT_SUFFIX)
    }

    fn stem(original: Option<&str>) -> &str {
        original
            .map(|name| {
                // Accept full paths; only the final component names the file.
                Path::new(name)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(name)
            })
            .and_then(|name| name.split('.').next())
            .filter(|stem| !stem.is_empty())
            .unwrap_or(Self::FALLBACK_STEM)
    }

    /// Best-effort MIME type from a file extension
    ///
    /// Unknown extensions map to `application/octet-stream`, which submission
    /// validation then rejects.
    #[must_use]
    pub fn mime_from_path<P: AsRef<Path>>(path: P) -> &'static str {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("bmp") => "image/bmp",
            Some("tif" | "tiff") => "image/tiff",
            _ => "application/octet-stream",
        }
    }
}
