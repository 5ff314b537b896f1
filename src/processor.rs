//! Background removal processor
//!
//! `BackgroundRemovalProcessor` runs one image through the pipeline:
//! decode → mask → optional composite → encode. It holds no per-run state, so
//! a single instance is shared by every job the job manager drives.

use crate::{
    backends::HeuristicClassifier,
    config::{BackgroundFill, ClassifierConfig, ServiceConfig},
    error::Result,
    image_processing,
    inference::BackgroundClassifier,
    services::{
        ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
        ProgressReporter, ProgressTracker,
    },
    types::{PixelBuffer, ProcessingTimings, RemovalResult},
};
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, Level};

/// Configuration for the background removal processor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessorConfig {
    /// Heuristic classifier thresholds
    pub classifier: ClassifierConfig,
    /// Background painted by the pipeline itself
    pub background: BackgroundFill,
    /// Log every pipeline stage
    pub verbose_progress: bool,
}

impl ProcessorConfig {
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }

    /// Extract the processor section of a service configuration
    #[must_use]
    pub fn from_service_config(config: &ServiceConfig) -> Self {
        Self {
            classifier: config.classifier,
            background: config.background,
            verbose_progress: false,
        }
    }
}

/// Builder for `ProcessorConfig`
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::default(),
        }
    }

    #[must_use]
    pub fn classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.config.classifier = classifier;
        self
    }

    #[must_use]
    pub fn brightness_threshold(mut self, threshold: u8) -> Self {
        self.config.classifier.brightness_threshold = threshold;
        self
    }

    #[must_use]
    pub fn channel_tolerance(mut self, tolerance: u8) -> Self {
        self.config.classifier.channel_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn background(mut self, background: BackgroundFill) -> Self {
        self.config.background = background;
        self
    }

    #[must_use]
    pub fn verbose_progress(mut self, verbose: bool) -> Self {
        self.config.verbose_progress = verbose;
        self
    }

    #[must_use]
    pub fn build(self) -> ProcessorConfig {
        self.config
    }
}

impl Default for ProcessorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless pipeline runner shared across jobs
pub struct BackgroundRemovalProcessor {
    config: ProcessorConfig,
    classifier: Arc<dyn BackgroundClassifier>,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("classifier", &self.classifier.name())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor using the heuristic classifier
    #[must_use]
    pub fn new(config: ProcessorConfig) -> Self {
        let classifier = Arc::new(HeuristicClassifier::new(config.classifier));
        Self::with_classifier(config, classifier)
    }

    /// Create a processor with a custom classifier
    #[must_use]
    pub fn with_classifier(
        config: ProcessorConfig,
        classifier: Arc<dyn BackgroundClassifier>,
    ) -> Self {
        let reporter: Arc<dyn ProgressReporter> = if config.verbose_progress {
            Arc::new(ConsoleProgressReporter::new(true))
        } else {
            Arc::new(NoOpProgressReporter)
        };
        Self {
            config,
            classifier,
            reporter,
        }
    }

    /// Replace the stage reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[must_use]
    pub fn classifier(&self) -> &dyn BackgroundClassifier {
        self.classifier.as_ref()
    }

    /// Run the pipeline with the configured background
    ///
    /// # Errors
    /// - `Decode` for unsupported or corrupt input
    /// - `Encode` if PNG encoding fails
    pub fn process_bytes(&self, image_bytes: &[u8]) -> Result<RemovalResult> {
        self.process_bytes_with_background(image_bytes, self.config.background)
    }

    /// Run the pipeline with an explicit background
    ///
    /// # Errors
    /// - `Decode` for unsupported or corrupt input
    /// - `Encode` if PNG encoding fails
    #[instrument(skip(self, image_bytes), fields(input_bytes = image_bytes.len(), background = %background.color_value()))]
    pub fn process_bytes_with_background(
        &self,
        image_bytes: &[u8],
        background: BackgroundFill,
    ) -> Result<RemovalResult> {
        let mut tracker = ProgressTracker::new(self.reporter.clone());
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::new();

        tracker.report_stage(ProcessingStage::Decoding);
        let decode_start = Instant::now();
        let buffer = ImageIOService::decode(image_bytes).map_err(|e| {
            tracker.report_error(&e.to_string());
            e
        })?;
        timings.decode_ms = decode_start.elapsed().as_millis() as u64;

        self.run_from_buffer(buffer, background, tracker, timings, total_start)
    }

    /// Run the pipeline on an already decoded buffer
    ///
    /// # Errors
    /// - `Encode` if PNG encoding fails
    pub fn process_buffer(
        &self,
        buffer: PixelBuffer,
        background: BackgroundFill,
    ) -> Result<RemovalResult> {
        let tracker = ProgressTracker::new(self.reporter.clone());
        self.run_from_buffer(buffer, background, tracker, ProcessingTimings::new(), Instant::now())
    }

    fn run_from_buffer(
        &self,
        buffer: PixelBuffer,
        background: BackgroundFill,
        mut tracker: ProgressTracker,
        mut timings: ProcessingTimings,
        total_start: Instant,
    ) -> Result<RemovalResult> {
        let (width, height) = buffer.dimensions();

        tracker.report_stage(ProcessingStage::Masking);
        let masked = {
            let _span = span!(
                Level::DEBUG,
                "masking",
                width = width,
                height = height,
                classifier = self.classifier.name()
            )
            .entered();
            let mask_start = Instant::now();
            let masked = image_processing::apply_mask(buffer, self.classifier.as_ref());
            timings.mask_ms = mask_start.elapsed().as_millis() as u64;
            masked
        };

        let output = if background.is_transparent() {
            debug!("Transparent background selected, skipping compositing");
            masked.clone()
        } else {
            tracker.report_stage(ProcessingStage::Compositing);
            let _span = span!(Level::DEBUG, "compositing", background = %background.color_value())
                .entered();
            let composite_start = Instant::now();
            let flat = image_processing::apply_background(masked.clone(), background);
            timings.composite_ms = composite_start.elapsed().as_millis() as u64;
            flat
        };

        tracker.report_stage(ProcessingStage::Encoding);
        let encode_start = Instant::now();
        let png = ImageIOService::encode_png(&output).map_err(|e| {
            tracker.report_error(&e.to_string());
            e
        })?;
        timings.encode_ms = encode_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Completed);
        tracker.report_completion(timings.clone());
        info!(
            width,
            height,
            total_ms = timings.total_ms,
            output_bytes = png.len(),
            "Background removed"
        );

        Ok(RemovalResult {
            masked,
            png,
            timings,
        })
    }

    /// Composite an existing masked buffer and encode it
    ///
    /// No decoding and no classification happens here; this is how a finished
    /// job is re-rendered against a different background.
    ///
    /// # Errors
    /// - `Encode` if PNG encoding fails
    pub fn render(&self, masked: &PixelBuffer, background: BackgroundFill) -> Result<Vec<u8>> {
        match background {
            BackgroundFill::Transparent => ImageIOService::encode_png(masked),
            BackgroundFill::Solid(_) => {
                let flat = image_processing::apply_background(masked.clone(), background);
                ImageIOService::encode_png(&flat)
            },
        }
    }
}
