//! Job lifecycle manager
//!
//! Owns the job set and the credit counter. Every mutation of a job goes
//! through that job's own lock, so unrelated jobs never contend with each
//! other; the job map lock is only held to insert, look up or remove.
//!
//! Lock order is always map, then record. Neither lock is held across an
//! `.await`.

use super::{
    events::JobEvent,
    job::{JobId, JobRecord, JobSnapshot, JobStatus, Submission},
    ticker::{spawn_progress_ticker, TickerSettings},
};
use crate::{
    config::{BackgroundFill, BackgroundOption, JobConfig, ServiceConfig, SubmissionLimits},
    credits::{CreditCounter, CreditStore, ProcessingCredits},
    error::{BgRemovalError, Result},
    processor::{BackgroundRemovalProcessor, ProcessorConfig},
    tracing_config::spans,
    types::RemovalResult,
    utils::SubmissionValidator,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn, Instrument};

type SharedRecord = Arc<Mutex<JobRecord>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    jobs: Mutex<HashMap<JobId, SharedRecord>>,
    next_seq: AtomicU64,
    processor: Arc<BackgroundRemovalProcessor>,
    credits: Arc<CreditCounter>,
    limits: SubmissionLimits,
    config: JobConfig,
    events: broadcast::Sender<JobEvent>,
    runtime: Handle,
}

/// Tracks submitted images through asynchronous processing
///
/// Cheap to clone; clones share the same job set.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("jobs", &lock(&self.inner.jobs).len())
            .field("credits", &self.inner.credits.summary())
            .finish_non_exhaustive()
    }
}

impl JobManager {
    /// Create a manager bound to the current tokio runtime
    ///
    /// # Errors
    /// - `InvalidConfig` if `config` is out of range
    /// - `Internal` when called outside a tokio runtime
    pub fn new(
        processor: Arc<BackgroundRemovalProcessor>,
        credits: Arc<CreditCounter>,
        limits: SubmissionLimits,
        config: JobConfig,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            BgRemovalError::internal(format!("JobManager requires a tokio runtime: {}", e))
        })?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                processor,
                credits,
                limits,
                config,
                events,
                runtime,
            }),
        })
    }

    /// Build the processor and load the credit counter from `store`
    ///
    /// # Errors
    /// - `InvalidConfig` if `config` is out of range
    /// - `Internal` when called outside a tokio runtime
    pub async fn from_config(config: &ServiceConfig, store: Arc<dyn CreditStore>) -> Result<Self> {
        config.validate()?;
        let processor = BackgroundRemovalProcessor::new(ProcessorConfig::from_service_config(config));
        let credits = CreditCounter::load(store, config.jobs.total_credits).await;
        Self::new(
            Arc::new(processor),
            Arc::new(credits),
            config.limits.clone(),
            config.jobs.clone(),
        )
    }

    /// Validate and start processing an image
    ///
    /// Returns as soon as the job exists; the pipeline runs on the blocking
    /// pool and the progress ticker on the runtime.
    ///
    /// # Errors
    /// - `Validation` for an unsupported type or oversized payload; no job is created
    pub fn submit(&self, submission: Submission) -> Result<JobId> {
        SubmissionValidator::validate(&submission.mime_type, submission.size(), &self.inner.limits)?;

        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = JobRecord::new(seq, submission);
        let id = record.id;
        let file_name = record.file_name.clone();
        let source = Arc::clone(&record.source);
        let token = record.cancel.clone();
        let shared = Arc::new(Mutex::new(record));

        lock(&self.inner.jobs).insert(id, Arc::clone(&shared));

        {
            let mut job = lock(&shared);
            job.status = JobStatus::Processing;
            job.progress = 0.0;
        }

        let span = spans::job(&id.to_string(), file_name.as_deref(), source.len());
        span.in_scope(|| info!("Job submitted"));
        let _ = self.inner.events.send(JobEvent::Submitted {
            id,
            file_name,
        });

        let _ticker = spawn_progress_ticker(
            &self.inner.runtime,
            shared,
            token,
            TickerSettings::from(&self.inner.config),
            self.inner.events.clone(),
        );

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(
            async move {
                let processor = Arc::clone(&inner.processor);
                let outcome = tokio::task::spawn_blocking(move || processor.process_bytes(&source))
                    .await
                    .unwrap_or_else(|e| {
                        Err(BgRemovalError::internal(format!("pipeline task failed: {}", e)))
                    });
                inner.finish(id, outcome).await;
            }
            .instrument(span),
        );

        Ok(id)
    }

    /// Snapshot of one job
    ///
    /// # Errors
    /// - `NotFound` for unknown or removed ids
    pub fn get_job(&self, id: JobId) -> Result<JobSnapshot> {
        let jobs = lock(&self.inner.jobs);
        let record = jobs.get(&id).ok_or_else(|| BgRemovalError::not_found(id))?;
        let snapshot = lock(record).snapshot();
        Ok(snapshot)
    }

    /// All jobs, most recently created first
    #[must_use]
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        let jobs = lock(&self.inner.jobs);
        let mut entries: Vec<(u64, JobSnapshot)> = jobs
            .values()
            .map(|record| {
                let job = lock(record);
                (job.seq, job.snapshot())
            })
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, snapshot)| snapshot).collect()
    }

    /// Drop a job and release everything it owns
    ///
    /// A job still processing has its ticker stopped; its pipeline may run to
    /// the end but the outcome is discarded and no credit is consumed.
    ///
    /// # Errors
    /// - `NotFound` for unknown or already removed ids
    pub fn remove(&self, id: JobId) -> Result<()> {
        let record = lock(&self.inner.jobs)
            .remove(&id)
            .ok_or_else(|| BgRemovalError::not_found(id))?;
        let status = {
            let job = lock(&record);
            job.cancel.cancel();
            job.status
        };
        debug!(job_id = %id, %status, "Job removed");
        let _ = self.inner.events.send(JobEvent::Removed { id });
        Ok(())
    }

    /// Start a new job from an existing job's original upload
    ///
    /// The existing job is left as it is.
    ///
    /// # Errors
    /// - `NotFound` for unknown ids
    /// - `Validation` if the limits have tightened since the first submission
    pub fn resubmit(&self, id: JobId) -> Result<JobId> {
        let previous = self.get_job(id)?;
        let mut submission = Submission::new(previous.source, previous.mime_type);
        submission.file_name = previous.file_name;
        let new_id = self.submit(submission)?;
        info!(previous = %id, job_id = %new_id, "Job resubmitted");
        Ok(new_id)
    }

    /// Receiver for job events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve once the job is Completed or Failed
    ///
    /// # Errors
    /// - `NotFound` if the job is unknown or removed while waiting
    pub async fn wait_for(&self, id: JobId) -> Result<JobSnapshot> {
        let mut rx = self.subscribe();
        loop {
            let snapshot = self.get_job(id)?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            match rx.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return Err(BgRemovalError::internal("job event channel closed"));
                },
            }
        }
    }

    /// Re-encode a completed job against another background
    ///
    /// Uses the cached mask; nothing is decoded or classified again.
    ///
    /// # Errors
    /// - `NotFound` for unknown ids
    /// - `JobNotReady` unless the job is Completed
    /// - `Encode` if PNG encoding fails
    pub async fn render_with_background(&self, id: JobId, background: BackgroundFill) -> Result<Vec<u8>> {
        let masked = {
            let jobs = lock(&self.inner.jobs);
            let record = jobs.get(&id).ok_or_else(|| BgRemovalError::not_found(id))?;
            let job = lock(record);
            match (&job.status, &job.masked) {
                (JobStatus::Completed, Some(masked)) => Arc::clone(masked),
                (status, _) => {
                    return Err(BgRemovalError::job_not_ready(
                        id,
                        format!("status is {}, only completed jobs can be re-rendered", status),
                    ));
                },
            }
        };

        let processor = Arc::clone(&self.inner.processor);
        let span = spans::render(&id.to_string(), &background.color_value());
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            processor.render(&masked, background)
        })
        .await
        .map_err(|e| BgRemovalError::internal(format!("render task failed: {}", e)))?
    }

    /// Backgrounds offered for previews, transparent first
    #[must_use]
    pub fn background_options(&self) -> Vec<BackgroundOption> {
        BackgroundOption::defaults()
    }

    #[must_use]
    pub fn credits(&self) -> ProcessingCredits {
        self.inner.credits.summary()
    }

    #[must_use]
    pub fn limits(&self) -> &SubmissionLimits {
        &self.inner.limits
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.jobs).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    /// Apply a pipeline outcome to its job
    ///
    /// The status change and the credit are applied under the map lock, so a
    /// concurrent `remove` either happens first (outcome discarded) or after
    /// (job already terminal).
    async fn finish(&self, id: JobId, outcome: Result<RemovalResult>) {
        let (event, charged) = {
            let jobs = lock(&self.jobs);
            let Some(record) = jobs.get(&id) else {
                debug!("Job removed before the pipeline finished, discarding outcome");
                return;
            };
            let mut job = lock(record);
            job.cancel.cancel();
            if job.status != JobStatus::Processing {
                warn!(status = %job.status, "Pipeline finished for a job that is not processing");
                return;
            }

            match outcome {
                Ok(result) => {
                    let output_bytes = result.png.len();
                    job.result = Some(Arc::from(result.png));
                    job.masked = Some(Arc::new(result.masked));
                    job.status = JobStatus::Completed;
                    job.progress = 100.0;
                    let used = self.credits.consume();
                    info!(output_bytes, credits_used = used, "Job completed");
                    (
                        JobEvent::Completed {
                            id,
                            output_bytes,
                            timings: result.timings,
                        },
                        true,
                    )
                },
                Err(e) => {
                    let error = e.to_string();
                    job.status = JobStatus::Failed;
                    job.progress = 0.0;
                    job.error = Some(error.clone());
                    warn!(error = %error, "Job failed");
                    (JobEvent::Failed { id, error }, false)
                },
            }
        };

        if charged {
            self.credits.persist().await;
        }
        let _ = self.events.send(event);
    }
}
