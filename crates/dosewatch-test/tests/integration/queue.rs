#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Durable queue semantics: claims, retries, cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Duration;

use dosewatch_core::clock::Clock;
use dosewatch_core::store::{JobKind, JobRecord, JobState, JobStore, NewJob};
use dosewatch_service::error::{ServiceError, ServiceResult};
use dosewatch_service::queue::JobQueue;
use dosewatch_service::queue::worker::{JobHandler, QueueWorker, WorkerConfig};
use dosewatch_test::{ManualClock, MemoryJobStore};
use uuid::Uuid;

use crate::helpers::start;

/// Handler that fails a configured number of times, counting calls.
struct FlakyHandler {
    calls: AtomicUsize,
    failures: usize,
}

impl FlakyHandler {
    fn failing(failures: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures,
        }
    }
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn handle(&self, _job: &JobRecord) -> ServiceResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ServiceError::ValidationError("transport down".into()));
        }
        Ok(())
    }
}

struct Rig {
    clock: Arc<ManualClock>,
    jobs: Arc<MemoryJobStore>,
    handler: Arc<FlakyHandler>,
    worker: QueueWorker,
}

fn rig(failures: usize) -> Rig {
    let clock = Arc::new(ManualClock::new(start()));
    let jobs = Arc::new(MemoryJobStore::default());
    let handler = Arc::new(FlakyHandler::failing(failures));
    let worker = QueueWorker::new(
        Arc::clone(&jobs) as Arc<dyn JobStore>,
        Arc::clone(&handler) as Arc<dyn JobHandler>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        WorkerConfig {
            poll_interval: std::time::Duration::from_secs(1),
            batch_size: 32,
            retry_base: Duration::seconds(60),
        },
    );
    Rig {
        clock,
        jobs,
        handler,
        worker,
    }
}

fn new_job(id: &str, fire_at: chrono::DateTime<chrono::Utc>) -> NewJob {
    NewJob {
        id: id.to_owned(),
        kind: JobKind::Fire,
        reminder_id: Uuid::new_v4(),
        fire_at,
        max_attempts: 3,
    }
}

#[test_log::test(tokio::test)]
async fn successful_job_is_marked_done() {
    let rig = rig(0);
    rig.jobs
        .upsert_pending(new_job("reminder:a", start() + Duration::minutes(1)))
        .await
        .unwrap();

    rig.clock.advance(Duration::minutes(2));
    rig.worker.drain_due().await;

    assert_eq!(rig.handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.jobs.job("reminder:a").unwrap().state, JobState::Done);
}

#[test_log::test(tokio::test)]
async fn failing_job_retries_with_exponential_backoff_then_drops() {
    let rig = rig(usize::MAX);
    rig.jobs
        .upsert_pending(new_job("reminder:a", start() + Duration::minutes(1)))
        .await
        .unwrap();

    // First attempt fails: re-queued one base delay out.
    rig.clock.advance(Duration::minutes(1));
    rig.worker.drain_due().await;
    let job = rig.jobs.job("reminder:a").unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.fire_at, rig.clock.now() + Duration::seconds(60));
    assert!(job.last_error.is_some());

    // Not due yet: nothing claimed.
    rig.worker.drain_due().await;
    assert_eq!(rig.handler.calls.load(Ordering::SeqCst), 1);

    // Second attempt fails: delay doubles.
    rig.clock.advance(Duration::seconds(60));
    rig.worker.drain_due().await;
    let job = rig.jobs.job("reminder:a").unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 2);
    assert_eq!(job.fire_at, rig.clock.now() + Duration::seconds(120));

    // Third attempt exhausts max_attempts: dropped as failed.
    rig.clock.advance(Duration::seconds(120));
    rig.worker.drain_due().await;
    let job = rig.jobs.job("reminder:a").unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 3);
    assert_eq!(rig.handler.calls.load(Ordering::SeqCst), 3);
}

#[test_log::test(tokio::test)]
async fn recovering_job_completes_after_a_retry() {
    let rig = rig(1);
    rig.jobs
        .upsert_pending(new_job("reminder:a", start() + Duration::minutes(1)))
        .await
        .unwrap();

    rig.clock.advance(Duration::minutes(1));
    rig.worker.drain_due().await;
    rig.clock.advance(Duration::seconds(60));
    rig.worker.drain_due().await;

    let job = rig.jobs.job("reminder:a").unwrap();
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.attempts, 1);
}

#[test_log::test(tokio::test)]
async fn cancelled_job_never_runs() {
    let rig = rig(0);
    rig.jobs
        .upsert_pending(new_job("reminder:a", start() + Duration::minutes(1)))
        .await
        .unwrap();
    assert!(rig.jobs.cancel("reminder:a").await.unwrap());

    rig.clock.advance(Duration::minutes(5));
    rig.worker.drain_due().await;

    assert_eq!(rig.handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        rig.jobs.job("reminder:a").unwrap().state,
        JobState::Cancelled
    );
    // Cancelling again (or cancelling the unknown) is a quiet no-op.
    assert!(!rig.jobs.cancel("reminder:a").await.unwrap());
    assert!(!rig.jobs.cancel("reminder:missing").await.unwrap());
}

#[test_log::test(tokio::test)]
async fn a_claimed_job_cannot_be_claimed_again() {
    let rig = rig(0);
    rig.jobs
        .upsert_pending(new_job("reminder:a", start()))
        .await
        .unwrap();

    let first = rig.jobs.claim_due(start(), 10).await.unwrap();
    assert_eq!(first.len(), 1);
    let second = rig.jobs.claim_due(start(), 10).await.unwrap();
    assert!(second.is_empty());
}

#[test_log::test(tokio::test)]
async fn abandoned_running_job_is_released_and_rerun() {
    let rig = rig(0);
    rig.jobs
        .upsert_pending(new_job("reminder:a", start()))
        .await
        .unwrap();

    // Claimed, then the claiming process dies before resolving it.
    let claimed = rig.jobs.claim_due(start(), 10).await.unwrap();
    assert_eq!(claimed.len(), 1);

    rig.clock.advance(Duration::minutes(1));
    rig.worker.recover_abandoned().await;
    assert_eq!(rig.jobs.job("reminder:a").unwrap().state, JobState::Pending);

    rig.worker.drain_due().await;
    assert_eq!(rig.handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.jobs.job("reminder:a").unwrap().state, JobState::Done);
}

#[test_log::test(tokio::test)]
async fn upsert_overwrites_a_pending_job() {
    let rig = rig(0);
    let first_at = start() + Duration::minutes(10);
    let second_at = start() + Duration::minutes(45);
    rig.jobs
        .upsert_pending(new_job("reminder:a", first_at))
        .await
        .unwrap();
    rig.jobs
        .upsert_pending(new_job("reminder:a", second_at))
        .await
        .unwrap();

    let all = rig.jobs.all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].fire_at, second_at);
    assert_eq!(all[0].attempts, 0);
}

#[test_log::test(tokio::test)]
async fn queue_skips_past_fire_times() {
    let clock = Arc::new(ManualClock::new(start()));
    let jobs = Arc::new(MemoryJobStore::default());
    let queue = JobQueue::new(
        Arc::clone(&jobs) as Arc<dyn JobStore>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        3,
    );

    let reminder_id = Uuid::new_v4();
    let scheduled = queue
        .schedule_fire(reminder_id, start() - Duration::minutes(1))
        .await
        .unwrap();
    assert!(!scheduled);
    assert!(jobs.all().is_empty());

    let scheduled = queue
        .schedule_fire(reminder_id, start() + Duration::minutes(1))
        .await
        .unwrap();
    assert!(scheduled);
    assert_eq!(jobs.all().len(), 1);
}
