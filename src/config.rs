//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Solid RGB background color used by the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::white()
    }
}

impl BackgroundColor {
    /// Create a new background color with RGB values
    ///
    /// # Examples
    /// ```rust
    /// use bgstrip::BackgroundColor;
    /// let purple = BackgroundColor::new(128, 0, 128);
    /// assert_eq!(purple.r, 128);
    /// ```
    #[must_use]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub fn white() -> Self {
        Self::new(255, 255, 255)
    }

    #[must_use]
    pub fn black() -> Self {
        Self::new(0, 0, 0)
    }

    /// Parse `#RRGGBB` or `#RGB` (the `#` is optional)
    ///
    /// # Examples
    /// ```rust
    /// use bgstrip::BackgroundColor;
    ///
    /// let red = BackgroundColor::parse_hex("#f00").unwrap();
    /// assert_eq!(red, BackgroundColor::new(255, 0, 0));
    /// let blue = BackgroundColor::parse_hex("3b82f6").unwrap();
    /// assert_eq!(blue, BackgroundColor::new(0x3b, 0x82, 0xf6));
    /// ```
    ///
    /// # Errors
    /// - `InvalidConfig` for anything that is not 3 or 6 hex digits
    pub fn parse_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BgRemovalError::invalid_config(format!(
                "Invalid hex color '{}'",
                hex
            )));
        }

        let component = |range: std::ops::Range<usize>| -> Result<u8> {
            digits
                .get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| {
                    BgRemovalError::invalid_config(format!("Invalid hex color '{}'", hex))
                })
        };

        match digits.len() {
            6 => Ok(Self::new(component(0..2)?, component(2..4)?, component(4..6)?)),
            // #RGB expands each digit: f -> ff
            3 => Ok(Self::new(
                component(0..1)? * 17,
                component(1..2)? * 17,
                component(2..3)? * 17,
            )),
            _ => Err(BgRemovalError::invalid_config(
                "Color must be in #RRGGBB or #RGB format",
            )),
        }
    }

    /// Lowercase `#rrggbb` representation
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// What to paint behind the masked image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", tag = "type", content = "color")]
pub enum BackgroundFill {
    /// Keep the alpha channel; compositing is skipped entirely
    #[default]
    Transparent,
    /// Flatten onto a solid color
    Solid(BackgroundColor),
}

impl BackgroundFill {
    /// Parse `transparent`, `#RRGGBB` or `#RGB`
    ///
    /// # Errors
    /// - `InvalidConfig` for malformed colors
    pub fn parse(value: &str) -> Result<Self> {
        if value.trim().eq_ignore_ascii_case("transparent") {
            Ok(Self::Transparent)
        } else {
            BackgroundColor::parse_hex(value).map(Self::Solid)
        }
    }

    #[must_use]
    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::Transparent)
    }

    /// The value shown to users, `transparent` or `#rrggbb`
    #[must_use]
    pub fn color_value(&self) -> String {
        match self {
            Self::Transparent => "transparent".to_string(),
            Self::Solid(color) => color.to_hex(),
        }
    }
}

/// A named background choice offered to preview front ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundOption {
    pub name: String,
    pub fill: BackgroundFill,
}

impl BackgroundOption {
    #[must_use]
    pub fn new<S: Into<String>>(name: S, fill: BackgroundFill) -> Self {
        Self {
            name: name.into(),
            fill,
        }
    }

    /// The standard palette, transparent first
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        let solid = |name: &str, r, g, b| {
            Self::new(name, BackgroundFill::Solid(BackgroundColor::new(r, g, b)))
        };
        vec![
            Self::new("Transparent", BackgroundFill::Transparent),
            solid("White", 0xff, 0xff, 0xff),
            solid("Black", 0x00, 0x00, 0x00),
            solid("Light Gray", 0xf3, 0xf4, 0xf6),
            solid("Blue", 0x3b, 0x82, 0xf6),
            solid("Green", 0x10, 0xb9, 0x81),
            solid("Orange", 0xf5, 0x9e, 0x0b),
            solid("Red", 0xef, 0x44, 0x44),
        ]
    }

    /// `{colorValue, displayName}` pair for UI consumers
    #[must_use]
    pub fn display_pair(&self) -> (String, &str) {
        (self.fill.color_value(), self.name.as_str())
    }
}

/// Thresholds for the heuristic background classifier
///
/// The defaults (brightness > 200, channel spread < 30) are demo constants, not
/// values derived from any segmentation method. They are kept configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Pixels whose average channel value exceeds this are background
    pub brightness_threshold: u8,
    /// Pixels whose pairwise channel differences are all below this are background
    pub channel_tolerance: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 200,
            channel_tolerance: 30,
        }
    }
}

/// Limits applied to submissions before a job is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionLimits {
    /// Maximum accepted byte length
    pub max_file_size: u64,
    /// Accepted MIME types (compared case-insensitively)
    pub accepted_mime_types: Vec<String>,
}

impl SubmissionLimits {
    /// Default maximum upload size (10 MiB)
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            accepted_mime_types: vec![
                "image/png".to_string(),
                "image/jpeg".to_string(),
                "image/jpg".to_string(),
            ],
        }
    }
}

/// Job lifecycle tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Interval between synthetic progress ticks
    pub tick_interval_ms: u64,
    /// Upper bound (exclusive) of a single random progress increment
    pub max_progress_increment: f32,
    /// Synthetic progress never passes this; 100 is reserved for completion
    pub progress_ceiling: f32,
    /// Capacity of the job event broadcast channel
    pub event_capacity: usize,
    /// Credit allowance shown in the credit summary
    pub total_credits: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            max_progress_increment: 20.0,
            progress_ceiling: 90.0,
            event_capacity: 256,
            total_credits: 100,
        }
    }
}

impl JobConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate ranges
    ///
    /// # Errors
    /// - `InvalidConfig` naming the offending parameter
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(BgRemovalError::config_value_error(
                "tick interval (ms)",
                self.tick_interval_ms,
                "1 or more",
                Some(500),
            ));
        }
        if !(self.max_progress_increment > 0.0 && self.max_progress_increment.is_finite()) {
            return Err(BgRemovalError::config_value_error(
                "max progress increment",
                self.max_progress_increment,
                "greater than 0",
                Some(20.0),
            ));
        }
        if !(self.progress_ceiling > 0.0 && self.progress_ceiling < 100.0) {
            return Err(BgRemovalError::config_value_error(
                "progress ceiling",
                self.progress_ceiling,
                "0-100 (exclusive)",
                Some(90.0),
            ));
        }
        if self.event_capacity == 0 {
            return Err(BgRemovalError::config_value_error(
                "event capacity",
                self.event_capacity,
                "1 or more",
                Some(256),
            ));
        }
        Ok(())
    }
}

/// Top level configuration for a processing service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub classifier: ClassifierConfig,
    pub limits: SubmissionLimits,
    pub jobs: JobConfig,
    /// Background applied by the pipeline itself; re-renders choose their own
    pub background: BackgroundFill,
}

impl ServiceConfig {
    /// Load configuration from a JSON file; missing fields fall back to defaults
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Serialization` if it is not valid JSON
    /// - `InvalidConfig` if a value is out of range
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    ///
    /// # Errors
    /// - `InvalidConfig` naming the offending parameter
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_file_size == 0 {
            return Err(BgRemovalError::config_value_error(
                "max file size",
                self.limits.max_file_size,
                "1 or more bytes",
                Some(SubmissionLimits::DEFAULT_MAX_FILE_SIZE),
            ));
        }
        if self.limits.accepted_mime_types.is_empty() {
            return Err(BgRemovalError::invalid_config(
                "At least one accepted MIME type is required",
            ));
        }
        self.jobs.validate()
    }
}
