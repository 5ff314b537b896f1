//! Pipeline stage reporting
//!
//! This module separates stage reporting from the pipeline itself, so front
//! ends decide how (and whether) to surface what the processor is doing. It
//! reports real stage boundaries; the per-job percentage shown to users is the
//! synthetic estimate kept by the job manager.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Stages of a single pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Decoding input bytes
    Decoding,
    /// Classifying pixels and zeroing background alpha
    Masking,
    /// Painting a solid background behind the masked image
    Compositing,
    /// Encoding the result as PNG
    Encoding,
    /// Pipeline finished
    Completed,
}

impl ProcessingStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Decoding => "Decoding input image",
            ProcessingStage::Masking => "Removing background",
            ProcessingStage::Compositing => "Applying background color",
            ProcessingStage::Encoding => "Encoding PNG output",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Nominal share of the pipeline finished once this stage begins
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Decoding => 5,
            ProcessingStage::Masking => 30,
            ProcessingStage::Compositing => 70,
            ProcessingStage::Encoding => 85,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Nominal progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Trait for reporting pipeline progress
pub trait ProgressReporter: Send + Sync {
    /// Report a stage transition
    fn report_progress(&self, update: ProgressUpdate);

    /// Report pipeline completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report a failure in the given stage
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// Progress reporter that discards everything
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Progress reporter that logs through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Log every stage and the timing breakdown instead of only failures
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::debug!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        if self.verbose {
            log::info!("Background removal completed: {}", timings.summary());
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("Error during {}: {}", stage.description(), error);
    }
}

/// Tracks one pipeline run and forwards stage changes to a shared reporter
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Tracker with a no-op reporter
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::new(stage, self.start_time);
        self.reporter.report_progress(update);
    }

    /// Report progress with custom description
    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::with_description(stage, description, self.start_time);
        self.reporter.report_progress(update);
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Decoding);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}
