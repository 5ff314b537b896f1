//! Upload validation: declared MIME type and size limit

use crate::{
    config::SubmissionLimits,
    error::{BgRemovalError, Result},
};

/// Validator for incoming image submissions
pub struct SubmissionValidator;

impl SubmissionValidator {
    /// Check a submission against the configured limits
    ///
    /// Only the declared type and byte length are checked here; whether the
    /// bytes really are a PNG/JPEG is the decoder's job and fails the job
    /// instead of the submission.
    ///
    /// # Examples
    /// ```rust
    /// use bgstrip::{config::SubmissionLimits, utils::SubmissionValidator};
    ///
    /// let limits = SubmissionLimits::default();
    /// assert!(SubmissionValidator::validate("image/png", 1024, &limits).is_ok());
    /// assert!(SubmissionValidator::validate("image/gif", 1024, &limits).is_err());
    /// ```
    ///
    /// # Errors
    /// - `Validation` for an unsupported type or an oversized payload
    pub fn validate(mime_type: &str, size: u64, limits: &SubmissionLimits) -> Result<()> {
        Self::validate_mime_type(mime_type, limits)?;
        Self::validate_size(size, limits)
    }

    /// Reject MIME types outside the accepted list
    ///
    /// # Errors
    /// - `Validation` naming the rejected type
    pub fn validate_mime_type(mime_type: &str, limits: &SubmissionLimits) -> Result<()> {
        let declared = mime_type.trim();
        let accepted = limits
            .accepted_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(declared));
        if accepted {
            Ok(())
        } else {
            Err(BgRemovalError::validation(format!(
                "Unsupported file type: {}. Please upload PNG or JPEG images.",
                if declared.is_empty() { "unknown" } else { declared }
            )))
        }
    }

    /// Reject payloads above the size limit
    ///
    /// # Errors
    /// - `Validation` quoting the limit in human units
    pub fn validate_size(size: u64, limits: &SubmissionLimits) -> Result<()> {
        if size > limits.max_file_size {
            return Err(BgRemovalError::validation(format!(
                "File size exceeds {} limit ({})",
                format_file_size(limits.max_file_size).replace(' ', ""),
                format_file_size(size)
            )));
        }
        Ok(())
    }
}

/// Human-readable byte size: `0 Bytes`, `1 KB`, `1.5 KB`, `10 MB`
///
/// Up to two decimals, trailing zeros dropped.
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let formatted = format!("{:.2}", size);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS.get(unit_index).unwrap_or(&"Bytes"))
}
