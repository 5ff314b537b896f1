//! Synthetic progress ticker
//!
//! The pipeline only reports success or failure, so while a job is processing
//! its progress is estimated: every tick adds a random increment below
//! `max_increment`, never passing `ceiling`. 100 is reserved for completion.

use super::{
    events::JobEvent,
    job::{JobRecord, JobStatus},
};
use crate::config::JobConfig;
use rand::Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub(crate) struct TickerSettings {
    pub(crate) interval: Duration,
    pub(crate) max_increment: f32,
    pub(crate) ceiling: f32,
}

impl From<&JobConfig> for TickerSettings {
    fn from(config: &JobConfig) -> Self {
        Self {
            interval: config.tick_interval(),
            max_increment: config.max_progress_increment,
            ceiling: config.progress_ceiling,
        }
    }
}

/// Next progress value after one tick
///
/// Never decreases and never exceeds `ceiling` unless it already did.
pub(crate) fn advance(current: f32, increment: f32, ceiling: f32) -> f32 {
    current.max((current + increment.max(0.0)).min(ceiling))
}

/// Spawn the ticker for one job
///
/// The task ends when `token` is cancelled or when it observes the job outside
/// `Processing`. The first tick fires one full interval after spawning.
pub(crate) fn spawn_progress_ticker(
    runtime: &Handle,
    record: Arc<Mutex<JobRecord>>,
    token: CancellationToken,
    settings: TickerSettings,
    events: broadcast::Sender<JobEvent>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut interval = time::interval_at(Instant::now() + settings.interval, settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    let increment = rand::thread_rng().gen_range(0.0..settings.max_increment);
                    let update = {
                        let mut job = record.lock().unwrap_or_else(PoisonError::into_inner);
                        if job.status != JobStatus::Processing || token.is_cancelled() {
                            None
                        } else {
                            job.progress = advance(job.progress, increment, settings.ceiling);
                            Some((job.id, job.progress))
                        }
                    };
                    match update {
                        Some((id, progress)) => {
                            tracing::trace!(job_id = %id, progress, "Progress tick");
                            let _ = events.send(JobEvent::Progress { id, progress });
                        },
                        None => break,
                    }
                },
            }
        }
    })
}
