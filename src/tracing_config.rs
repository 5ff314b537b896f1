//! Tracing configuration and span helpers
//!
//! The library only emits events and spans. Installing a subscriber is left to
//! binaries, which do it through [`TracingConfig::init`] (behind the `cli`
//! feature).

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored compact output for interactive terminals
    Console,
    /// Plain compact output for CI logs
    Compact,
    /// One JSON object per event
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// stderr
    Console,
    /// A single log file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
}

/// Keeps background log writers alive; drop it only at process exit
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Subscriber configuration builder
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// 0 = info, 1 = debug, 2+ = trace
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Explicit filter directive, takes precedence over `verbosity`
    pub env_filter: Option<String>,
    /// Correlation id logged once at startup
    pub run_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            run_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_run_id<S: Into<String>>(mut self, run_id: S) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// `RUST_LOG` wins over both `env_filter` and `verbosity` when set.
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let filter = match (std::env::var("RUST_LOG").ok(), &self.env_filter) {
            (Some(directive), _) if !directive.trim().is_empty() => EnvFilter::try_new(directive)?,
            (_, Some(directive)) => EnvFilter::try_new(directive)?,
            _ => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .compact();
                registry.with(layer).try_init()?;
            },
            (TracingFormat::Compact, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                use tracing_appender::{non_blocking, rolling};

                let directory = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let file_name = path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("bgstrip.log"));
                let (writer, file_guard) = non_blocking(rolling::never(directory, file_name));
                guard._file_guard = Some(file_guard);

                match format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        let layer = fmt::layer().with_ansi(false).with_writer(writer).compact();
                        registry.with(layer).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        let layer = fmt::layer()
                            .json()
                            .with_writer(writer)
                            .with_current_span(true)
                            .with_span_list(true);
                        registry.with(layer).try_init()?;
                    },
                }
            },
        }

        if let Some(run_id) = &self.run_id {
            tracing::info!(run_id = %run_id, "bgstrip run started");
        }

        Ok(guard)
    }
}

/// Install a console subscriber for the CLI
///
/// # Errors
/// - Invalid filter directives
/// - A global subscriber is already installed
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<TracingGuard> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_run_id(uuid::Uuid::new_v4().to_string())
        .init()
}

/// Span constructors shared by the job manager and the CLI
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering one job from submission to its terminal state
    pub fn job(job_id: &str, file_name: Option<&str>, input_bytes: usize) -> Span {
        tracing::span!(
            Level::INFO,
            "job",
            job_id = %job_id,
            file_name = file_name.unwrap_or("-"),
            input_bytes
        )
    }

    /// Span for a directory or glob batch in the CLI
    pub fn batch(file_count: usize) -> Span {
        tracing::span!(Level::INFO, "batch", file_count)
    }

    /// Span for re-rendering a finished job onto a new background
    pub fn render(job_id: &str, background: &str) -> Span {
        tracing::span!(
            Level::DEBUG,
            "render",
            job_id = %job_id,
            background = %background
        )
    }
}
