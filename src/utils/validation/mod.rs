//! Input validation
//!
//! Everything here runs before a job exists; failures surface as
//! `BgRemovalError::Validation` and never reach the pipeline.

pub mod submission;

pub use submission::{format_file_size, SubmissionValidator};
