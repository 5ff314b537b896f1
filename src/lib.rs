#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # bgstrip
//!
//! Heuristic background removal with an asynchronous job queue.
//!
//! An image goes through a fixed pipeline: decode (PNG or JPEG) → classify
//! every pixel as background or foreground → zero the alpha of background
//! pixels → optionally flatten onto a solid color → encode as PNG.
//!
//! The classifier is a brightness / color-uniformity heuristic, not a trained
//! segmentation model. It sits behind the [`BackgroundClassifier`] trait, so a
//! real model can be dropped in without touching the pipeline.
//!
//! ## Features
//!
//! - **Pipeline**: [`BackgroundRemovalProcessor`] runs one image end to end
//! - **Jobs**: [`JobManager`] tracks uploads through `Queued → Processing →
//!   Completed | Failed` with a synthetic progress estimate and an event channel
//! - **Re-rendering**: completed jobs can be re-encoded on any background
//!   without classifying again
//! - **Credits**: one credit per completed job, persisted through a
//!   [`CreditStore`]
//! - **CLI**: `bgstrip` binary (enable with the `cli` feature)
//!
//! ## Quick Start
//!
//! ### One-shot
//!
//! ```rust,no_run
//! use bgstrip::{remove_background_from_bytes, ProcessorConfig};
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let result = remove_background_from_bytes(&upload, &ProcessorConfig::default()).await?;
//! std::fs::write("photo_no_bg.png", &result.png)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Job queue
//!
//! ```rust,no_run
//! use bgstrip::{JobManager, JobStatus, MemoryCreditStore, ServiceConfig, Submission};
//! use std::sync::Arc;
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let manager =
//!     JobManager::from_config(&ServiceConfig::default(), Arc::new(MemoryCreditStore::new())).await?;
//!
//! let id = manager.submit(Submission::new(upload, "image/png").with_file_name("cat.png"))?;
//! let job = manager.wait_for(id).await?;
//! assert_eq!(job.status, JobStatus::Completed);
//! println!("{} credits left", manager.credits().remaining);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars, subscriber setup
//! - `tracing-json`: JSON log output
//! - `tracing-files`: log to a file
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! bgstrip = { version = "0.1", default-features = false }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod credits;
pub mod error;
pub mod image_processing;
pub mod inference;
pub mod jobs;
pub mod processor;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

pub use backends::HeuristicClassifier;
pub use config::{
    BackgroundColor, BackgroundFill, BackgroundOption, ClassifierConfig, JobConfig, ServiceConfig,
    SubmissionLimits,
};
pub use credits::{
    CreditCounter, CreditStore, JsonFileCreditStore, MemoryCreditStore, ProcessingCredits,
};
pub use error::{BgRemovalError, Result};
pub use image_processing::{apply_background, apply_mask, composite_on_color};
pub use inference::BackgroundClassifier;
pub use jobs::{JobEvent, JobId, JobManager, JobSnapshot, JobStatus, Submission};
pub use processor::{BackgroundRemovalProcessor, ProcessorConfig, ProcessorConfigBuilder};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormatHandler,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use types::{PixelBuffer, PixelClass, ProcessingTimings, RemovalResult};
pub use utils::{format_file_size, SubmissionValidator};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{spans, TracingConfig, TracingFormat, TracingOutput};

/// Remove the background from encoded image bytes
///
/// Runs the pipeline on the blocking pool. No job is created and no credit
/// is consumed.
///
/// # Examples
///
/// ```rust,no_run
/// use bgstrip::{remove_background_from_bytes, BackgroundFill, ProcessorConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let config = ProcessorConfig::builder()
///     .background(BackgroundFill::parse("#3b82f6")?)
///     .build();
/// let result = remove_background_from_bytes(&upload, &config).await?;
/// println!("{}", result.timings.summary());
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &ProcessorConfig,
) -> Result<RemovalResult> {
    let processor = BackgroundRemovalProcessor::new(config.clone());
    let bytes = image_bytes.to_vec();
    tokio::task::spawn_blocking(move || processor.process_bytes(&bytes))
        .await
        .map_err(|e| BgRemovalError::internal(format!("pipeline task failed: {}", e)))?
}

/// Remove the background from an async reader
///
/// The stream is read to the end before decoding.
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    config: &ProcessorConfig,
) -> Result<RemovalResult> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer).await?;
    remove_background_from_bytes(&buffer, config).await
}
