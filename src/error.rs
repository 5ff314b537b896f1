//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Comprehensive error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from the `image` crate outside of decode/encode
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Submission rejected before a job was created (type or size)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed, truncated or unsupported image bytes
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Encoding the result buffer failed
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Pixel buffer whose data length does not match its dimensions
    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    /// Unknown job id
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Operation requires a job in a different state
    #[error("Job {id} is not ready: {reason}")]
    JobNotReady { id: String, reason: String },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Credit store read/write failures
    #[error("Credit store error: {0}")]
    Credits(String),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new invalid buffer error
    pub fn invalid_buffer<S: Into<String>>(msg: S) -> Self {
        Self::InvalidBuffer(msg.into())
    }

    /// Create a new not found error for a job id
    pub fn not_found<S: ToString>(id: S) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Create a new job-not-ready error
    pub fn job_not_ready<S: ToString, R: Into<String>>(id: S, reason: R) -> Self {
        Self::JobNotReady {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new credit store error
    pub fn credits<S: Into<String>>(msg: S) -> Self {
        Self::Credits(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error was raised before a job existed
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
