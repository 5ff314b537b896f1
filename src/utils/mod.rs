//! Shared utilities

pub mod validation;

pub use validation::{format_file_size, SubmissionValidator};
