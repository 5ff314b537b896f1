//! Job lifecycle integration tests
//!
//! Covers the state machine, synthetic progress, removal and credit
//! accounting through the public `JobManager` API.

use bgstrip::{
    BackgroundClassifier, BackgroundRemovalProcessor, BgRemovalError, ClassifierConfig,
    CreditCounter, HeuristicClassifier, ImageIOService, JobConfig, JobEvent, JobId, JobManager,
    JobStatus, MemoryCreditStore, PixelBuffer, PixelClass, ProcessorConfig, ServiceConfig,
    Submission, SubmissionLimits,
};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

const WHITE: [u8; 4] = [255, 255, 255, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

/// Blocks classification until opened, so a job can be held in Processing
#[derive(Debug, Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }
}

#[derive(Debug)]
struct GatedClassifier {
    gate: Arc<Gate>,
    inner: HeuristicClassifier,
}

impl BackgroundClassifier for GatedClassifier {
    fn classify(&self, pixel: [u8; 4]) -> PixelClass {
        self.gate.wait();
        self.inner.classify(pixel)
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

fn png(pixels: &[[u8; 4]], width: u32, height: u32) -> Vec<u8> {
    let buffer = PixelBuffer::from_pixels(width, height, pixels).unwrap();
    ImageIOService::encode_png(&buffer).unwrap()
}

fn white_square() -> Submission {
    Submission::new(png(&[WHITE; 4], 2, 2), "image/png").with_file_name("white.png")
}

async fn default_manager(store: MemoryCreditStore) -> JobManager {
    JobManager::from_config(&ServiceConfig::default(), Arc::new(store))
        .await
        .unwrap()
}

async fn gated_manager(gate: Arc<Gate>, jobs: JobConfig, store: MemoryCreditStore) -> JobManager {
    let classifier = Arc::new(GatedClassifier {
        gate,
        inner: HeuristicClassifier::new(ClassifierConfig::default()),
    });
    let processor = BackgroundRemovalProcessor::with_classifier(ProcessorConfig::default(), classifier);
    let credits = CreditCounter::load(Arc::new(store), jobs.total_credits).await;
    JobManager::new(
        Arc::new(processor),
        Arc::new(credits),
        SubmissionLimits::default(),
        jobs,
    )
    .unwrap()
}

fn fast_ticks() -> JobConfig {
    JobConfig {
        tick_interval_ms: 5,
        ..JobConfig::default()
    }
}

#[tokio::test]
async fn test_white_image_completes_with_full_progress_and_one_credit() {
    let store = MemoryCreditStore::new();
    let manager = default_manager(store.clone()).await;

    let id = manager.submit(white_square()).unwrap();
    let job = manager.wait_for(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percent(), 100);
    assert!(job.error.is_none());

    let result = ImageIOService::decode(job.result.as_deref().unwrap()).unwrap();
    assert_eq!(result.dimensions(), (2, 2));
    assert!(result.pixels().all(|px| px[3] == 0));

    assert_eq!(manager.credits().used, 1);
    assert_eq!(store.value(), 1);
}

#[tokio::test]
async fn test_red_pixel_survives_masking() {
    let manager = default_manager(MemoryCreditStore::new()).await;
    let id = manager
        .submit(Submission::new(png(&[RED, WHITE, WHITE, WHITE], 2, 2), "image/png"))
        .unwrap();

    let job = manager.wait_for(id).await.unwrap();
    let result = ImageIOService::decode(job.result.as_deref().unwrap()).unwrap();

    assert_eq!(result.pixel(0, 0), Some(RED));
    assert_eq!(result.pixel(1, 0).map(|px| px[3]), Some(0));
    assert_eq!(result.pixel(0, 1).map(|px| px[3]), Some(0));
    assert_eq!(result.pixel(1, 1).map(|px| px[3]), Some(0));
}

#[tokio::test]
async fn test_invalid_image_fails_and_keeps_source() {
    let store = MemoryCreditStore::new();
    let manager = default_manager(store.clone()).await;

    let id = manager
        .submit(Submission::new(b"this is not a png".to_vec(), "image/png"))
        .unwrap();
    let job = manager.wait_for(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress_percent(), 0);
    assert!(job.error.as_deref().is_some_and(|e| !e.is_empty()));
    assert_eq!(&*job.source, b"this is not a png");
    assert_eq!(manager.credits().used, 0);
    assert_eq!(store.value(), 0);
}

#[tokio::test]
async fn test_oversized_submission_is_rejected_before_job_creation() {
    let manager = default_manager(MemoryCreditStore::new()).await;
    let mut rx = manager.subscribe();
    let oversized = vec![0u8; (SubmissionLimits::DEFAULT_MAX_FILE_SIZE + 1) as usize];

    let err = manager
        .submit(Submission::new(oversized, "image/png"))
        .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("10MB"));
    assert!(manager.list_jobs().is_empty());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(manager.credits().used, 0);
}

#[tokio::test]
async fn test_credits_count_only_completed_jobs() {
    let store = MemoryCreditStore::with_value(10);
    let manager = default_manager(store.clone()).await;

    let mut ids = Vec::new();
    for i in 0..6 {
        let submission = if i % 3 == 2 {
            Submission::new(b"broken".to_vec(), "image/png")
        } else {
            white_square()
        };
        ids.push(manager.submit(submission).unwrap());
    }

    let jobs = futures::future::join_all(ids.iter().map(|id| manager.wait_for(*id))).await;
    let completed = jobs
        .into_iter()
        .map(Result::unwrap)
        .filter(|job| job.status == JobStatus::Completed)
        .count();

    assert_eq!(completed, 4);
    let credits = manager.credits();
    assert_eq!(credits.used, 14);
    assert_eq!(credits.total, 100);
    assert_eq!(credits.remaining, 86);
    assert_eq!(store.value(), 14);
}

#[tokio::test]
async fn test_list_jobs_is_newest_first() {
    let manager = default_manager(MemoryCreditStore::new()).await;
    let first = manager.submit(white_square()).unwrap();
    let second = manager.submit(white_square()).unwrap();
    let third = manager
        .submit(Submission::new(b"x".to_vec(), "image/jpeg"))
        .unwrap();

    let listed: Vec<JobId> = manager.list_jobs().iter().map(|job| job.id).collect();
    assert_eq!(listed, vec![third, second, first]);

    for id in listed {
        manager.wait_for(id).await.unwrap();
    }
    let listed: Vec<JobId> = manager.list_jobs().iter().map(|job| job.id).collect();
    assert_eq!(listed, vec![third, second, first]);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_capped_while_processing() {
    let gate = Arc::new(Gate::default());
    let manager = gated_manager(gate.clone(), fast_ticks(), MemoryCreditStore::new()).await;
    let mut rx = manager.subscribe();

    let id = manager.submit(white_square()).unwrap();
    assert_eq!(manager.get_job(id).unwrap().status, JobStatus::Processing);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let job = manager.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.progress <= 90.0);

    gate.open();
    let done = manager.wait_for(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let mut last = 0.0_f32;
    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            JobEvent::Progress { id: event_id, progress } if event_id == id => {
                assert!(!saw_completed, "progress tick after completion");
                assert!(progress >= last);
                assert!(progress <= 90.0);
                last = progress;
            },
            JobEvent::Completed { id: event_id, .. } if event_id == id => saw_completed = true,
            _ => {},
        }
    }
    assert!(saw_completed);
}

#[tokio::test]
async fn test_no_progress_events_after_completion() {
    let manager = JobManager::from_config(
        &ServiceConfig {
            jobs: fast_ticks(),
            ..ServiceConfig::default()
        },
        Arc::new(MemoryCreditStore::new()),
    )
    .await
    .unwrap();

    let id = manager.submit(white_square()).unwrap();
    manager.wait_for(id).await.unwrap();

    let mut rx = manager.subscribe();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(manager.get_job(id).unwrap().progress_percent(), 100);
}

#[tokio::test]
async fn test_remove_mid_flight_discards_result_and_credit() {
    let gate = Arc::new(Gate::default());
    let store = MemoryCreditStore::new();
    let manager = gated_manager(gate.clone(), fast_ticks(), store.clone()).await;
    let mut rx = manager.subscribe();

    let id = manager.submit(white_square()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.remove(id).unwrap();

    assert!(matches!(manager.get_job(id), Err(BgRemovalError::NotFound(_))));
    assert!(manager.list_jobs().is_empty());

    gate.open();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(matches!(manager.get_job(id), Err(BgRemovalError::NotFound(_))));
    assert_eq!(manager.credits().used, 0);
    assert_eq!(store.value(), 0);

    let mut saw_removed = false;
    let mut after_removed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if saw_removed {
            after_removed.push(event);
        } else if matches!(event, JobEvent::Removed { id: removed } if removed == id) {
            saw_removed = true;
        }
    }
    assert!(saw_removed);
    assert!(
        after_removed.iter().all(|event| event.job_id() != id),
        "events after removal: {:?}",
        after_removed
    );
}

#[tokio::test]
async fn test_wait_for_removed_job_reports_not_found() {
    let gate = Arc::new(Gate::default());
    let manager = gated_manager(gate.clone(), fast_ticks(), MemoryCreditStore::new()).await;
    let id = manager.submit(white_square()).unwrap();

    let waiter = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.wait_for(id).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.remove(id).unwrap();
    gate.open();

    let outcome = waiter.await.unwrap();
    assert!(matches!(outcome, Err(BgRemovalError::NotFound(_))));
}

#[tokio::test]
async fn test_resubmit_creates_independent_job() {
    let manager = default_manager(MemoryCreditStore::new()).await;
    let failed = manager
        .submit(Submission::new(b"junk".to_vec(), "image/png").with_file_name("junk.png"))
        .unwrap();
    manager.wait_for(failed).await.unwrap();

    let retry = manager.resubmit(failed).unwrap();
    assert_ne!(retry, failed);

    let retried = manager.wait_for(retry).await.unwrap();
    assert_eq!(retried.status, JobStatus::Failed);
    assert_eq!(retried.file_name.as_deref(), Some("junk.png"));

    let original = manager.get_job(failed).unwrap();
    assert_eq!(original.status, JobStatus::Failed);
    assert_eq!(manager.list_jobs().len(), 2);
    assert!(manager.resubmit(JobId::new()).is_err());
}

#[tokio::test]
async fn test_render_rejected_while_processing() {
    let gate = Arc::new(Gate::default());
    let manager = gated_manager(gate.clone(), fast_ticks(), MemoryCreditStore::new()).await;
    let id = manager.submit(white_square()).unwrap();

    let err = manager
        .render_with_background(id, bgstrip::BackgroundFill::Transparent)
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::JobNotReady { .. }));
    assert!(err.to_string().contains("processing"));

    gate.open();
    manager.wait_for(id).await.unwrap();
    assert!(manager
        .render_with_background(id, bgstrip::BackgroundFill::Transparent)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_submission_events_sequence() {
    let manager = default_manager(MemoryCreditStore::new()).await;
    let mut rx = manager.subscribe();

    let id = manager.submit(white_square()).unwrap();
    manager.wait_for(id).await.unwrap();
    manager.remove(id).unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            JobEvent::Submitted { file_name, .. } => {
                assert_eq!(file_name.as_deref(), Some("white.png"));
                kinds.push("submitted");
            },
            JobEvent::Progress { .. } => {},
            JobEvent::Completed { output_bytes, .. } => {
                assert!(output_bytes > 0);
                kinds.push("completed");
            },
            JobEvent::Failed { .. } => kinds.push("failed"),
            JobEvent::Removed { .. } => kinds.push("removed"),
        }
    }
    assert_eq!(kinds, vec!["submitted", "completed", "removed"]);
}
