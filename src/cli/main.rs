//! bgstrip command line front end
//!
//! Submits every input to a [`JobManager`], drives one progress bar per job
//! from the job event stream and writes `<stem>_no_bg.png` next to the input
//! or into `--output`.

use super::config::CliConfigBuilder;
use crate::{
    config::BackgroundOption,
    jobs::{JobEvent, JobId, JobManager, JobSnapshot, JobStatus, Submission},
    services::{ImageIOService, OutputFormatHandler},
    tracing_config::{spans, TracingConfig, TracingFormat, TracingGuard},
    utils::format_file_size,
};
use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Heuristic background removal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgstrip")]
pub struct Cli {
    /// Input images or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required_unless_present = "list_backgrounds")]
    pub input: Vec<String>,

    /// Output file (single input) or directory (several inputs). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Background to flatten onto: "transparent", #RRGGBB or #RGB
    #[arg(short, long, value_name = "COLOR")]
    pub background: Option<String>,

    /// Maximum accepted input size in bytes [default: 10 MiB]
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,

    /// Credit counter file [default: <data dir>/bgstrip/credits.json]
    #[arg(long, value_name = "PATH")]
    pub credits_file: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the background palette and exit
    #[arg(long)]
    pub list_backgrounds: bool,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g. "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = init_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.list_backgrounds {
        print_backgrounds();
        return Ok(());
    }

    if cli.input.is_empty() {
        anyhow::bail!("At least one input is required");
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let store = CliConfigBuilder::credit_store(&cli)?;
    let manager = JobManager::from_config(&config, store)
        .await
        .context("Failed to start job manager")?;

    debug!(
        background = %config.background.color_value(),
        max_file_size = config.limits.max_file_size,
        "Configuration resolved"
    );

    let start = Instant::now();
    let failed = if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        process_stdin(&manager, cli.output.as_deref()).await?
    } else {
        process_inputs(&cli, &manager).await?
    };

    let credits = manager.credits();
    eprintln!(
        "Credits: {} used, {} of {} remaining ({:.2}s)",
        credits.used,
        credits.remaining,
        credits.total,
        start.elapsed().as_secs_f64()
    );

    if failed > 0 {
        anyhow::bail!("{} input(s) failed", failed);
    }
    Ok(())
}

fn init_tracing(verbose_count: u8) -> Result<TracingGuard> {
    let guard = TracingConfig::new()
        .with_verbosity(verbose_count)
        .with_format(TracingFormat::Console)
        .with_run_id(uuid::Uuid::new_v4().to_string())
        .init()
        .context("Failed to initialize tracing subscriber")?;
    debug!(verbosity = verbose_count, "Tracing initialized");
    Ok(guard)
}

fn print_backgrounds() {
    for option in BackgroundOption::defaults() {
        let (value, name) = option.display_pair();
        println!("{:<12} {}", value, name);
    }
}

/// Process one image from stdin; returns the number of failures
async fn process_stdin(manager: &JobManager, output: Option<&Path>) -> Result<usize> {
    let mut data = Vec::new();
    io::stdin()
        .read_to_end(&mut data)
        .context("Failed to read image data from stdin")?;
    if data.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    let mime = match ImageIOService::detect_format(&data) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        _ => "image/png",
    };
    info!(bytes = data.len(), mime, "Read image from stdin");

    let id = manager.submit(Submission::new(data, mime))?;
    let job = manager.wait_for(id).await?;
    let Some(png) = finished_bytes(&job) else {
        eprintln!("stdin: {}", job.error.as_deref().unwrap_or("failed"));
        return Ok(1);
    };

    match output {
        Some(path) if path != Path::new("-") => {
            ImageIOService::save_bytes(png, path)?;
            info!(path = %path.display(), "Result written");
        },
        _ => {
            let mut stdout = io::stdout();
            stdout
                .write_all(png)
                .and_then(|()| stdout.flush())
                .context("Failed to write image data to stdout")?;
        },
    }
    Ok(0)
}

/// Process every file input; returns the number of failures
async fn process_inputs(cli: &Cli, manager: &JobManager) -> Result<usize> {
    let files = collect_input_files(&cli.input, cli.recursive, cli.pattern.as_deref())?;
    if files.is_empty() {
        warn!("No PNG or JPEG files found in the provided inputs");
        return Ok(0);
    }
    process_files(cli, manager, files).await
}

/// Submit `files`, wait for all of them and write the results
///
/// A file that cannot be read or is rejected counts as a failure; the rest of
/// the batch still runs.
async fn process_files(cli: &Cli, manager: &JobManager, files: Vec<PathBuf>) -> Result<usize> {
    let batch = files.len() > 1;
    let output = cli.output.as_deref();
    if batch {
        prepare_output_dir(output)?;
    }
    spans::batch(files.len()).in_scope(|| info!("Processing {} file(s)", files.len()));

    let bars = MultiProgress::new();
    let tracked: Arc<Mutex<HashMap<JobId, ProgressBar>>> = Arc::default();
    let listener = spawn_progress_listener(manager, Arc::clone(&tracked));

    let mut failed = 0;
    let mut pending = Vec::new();
    for path in &files {
        let bar = bars.add(job_bar(path));
        let submission = match Submission::from_path(path).await {
            Ok(submission) => submission,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable input");
                bar.abandon_with_message(format!("unreadable: {}", e));
                failed += 1;
                continue;
            },
        };
        match manager.submit(submission) {
            Ok(id) => {
                tracked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id, bar.clone());
                pending.push((path.clone(), id, bar));
            },
            Err(e) => {
                bar.abandon_with_message(format!("rejected: {}", e));
                failed += 1;
            },
        }
    }

    let results = join_all(pending.iter().map(|(_, id, _)| manager.wait_for(*id))).await;
    listener.abort();

    let mut written = HashSet::new();
    for ((path, _, bar), result) in pending.iter().zip(results) {
        let job = result?;
        match finished_bytes(&job) {
            Some(png) => {
                let destination = claim_output_path(
                    &mut written,
                    resolve_output_path(path, &job.output_file_name(), output, batch),
                );
                ImageIOService::save_bytes(png, &destination)?;
                bar.finish_with_message(format!(
                    "{} ({})",
                    destination.display(),
                    format_file_size(png.len() as u64)
                ));
            },
            None => {
                bar.abandon_with_message(job.error.clone().unwrap_or_else(|| "failed".to_string()));
                failed += 1;
            },
        }
    }

    Ok(failed)
}

fn finished_bytes(job: &JobSnapshot) -> Option<&[u8]> {
    match job.status {
        JobStatus::Completed => job.result.as_deref(),
        _ => None,
    }
}

fn job_bar(path: &Path) -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {prefix} {msg}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.set_prefix(
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    bar
}

fn spawn_progress_listener(
    manager: &JobManager,
    tracked: Arc<Mutex<HashMap<JobId, ProgressBar>>>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(JobEvent::Progress { id, progress }) => {
                    let bars = tracked.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Some(bar) = bars.get(&id) {
                        bar.set_position(progress.round() as u64);
                    }
                },
                Ok(JobEvent::Completed { id, .. }) => {
                    let bars = tracked.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Some(bar) = bars.get(&id) {
                        bar.set_position(100);
                    }
                },
                Ok(_) | Err(RecvError::Lagged(_)) => {},
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn prepare_output_dir(output: Option<&Path>) -> Result<()> {
    let Some(dir) = output else {
        return Ok(());
    };
    if dir == Path::new("-") {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }
    if dir.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            dir.display()
        );
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

/// Expand files and directories into a sorted list of candidate images
fn collect_input_files(inputs: &[String], recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_file() {
            if is_image_file(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, recursive, pattern)?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Find PNG/JPEG files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_image_file(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_image_file(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| glob::Pattern::new(pat).is_ok_and(|p| p.matches(name))),
        None => true,
    }
}

/// Where a result goes
///
/// A single input with an explicit `.png` output writes exactly there; every
/// other case writes `<stem>_no_bg.png` into the output directory, or next to
/// the input when no output was given.
fn resolve_output_path(input: &Path, file_name: &str, output: Option<&Path>, batch: bool) -> PathBuf {
    match output {
        Some(out)
            if !batch
                && !out.is_dir()
                && OutputFormatHandler::mime_from_path(out) == OutputFormatHandler::OUTPUT_MIME =>
        {
            out.to_path_buf()
        },
        Some(dir) => dir.join(file_name),
        None => input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(file_name),
    }
}

/// Reserve `candidate` for this run, suffixing `-1`, `-2`, ... when another
/// input already claimed it (`cat.png` and `cat.jpg` share `cat_no_bg.png`)
fn claim_output_path(claimed: &mut HashSet<PathBuf>, candidate: PathBuf) -> PathBuf {
    if claimed.insert(candidate.clone()) {
        return candidate;
    }

    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());

    let mut n = 1usize;
    loop {
        let next = candidate.with_file_name(format!("{}-{}.{}", stem, n, extension));
        if claimed.insert(next.clone()) {
            warn!(
                original = %candidate.display(),
                renamed = %next.display(),
                "Output name already used in this batch"
            );
            return next;
        }
        n += 1;
    }
}
