//! Polling worker that drains due jobs from the store.
//!
//! Claiming is atomic in the store (pending -> running), so a job id can
//! never be concurrently re-entered even with multiple workers. Handler
//! failures are contained per job: a failed attempt is re-queued with
//! exponential backoff until `max_attempts`, then dropped with a log
//! line. Nothing a handler does can take the worker loop down.

use std::sync::Arc;

use async_trait::async_trait;

use dosewatch_core::clock::Clock;
use dosewatch_core::store::{JobRecord, JobStore};

use crate::error::ServiceResult;

/// Receives claimed jobs. Handlers see at-least-once delivery and must
/// re-check persisted state before acting.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// ## Errors
    /// A returned error re-queues the job for a backoff retry.
    async fn handle(&self, job: &JobRecord) -> ServiceResult<()>;
}

/// Tuning knobs for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: std::time::Duration,
    pub batch_size: i64,
    pub retry_base: chrono::Duration,
}

pub struct QueueWorker {
    jobs: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl QueueWorker {
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        handler: Arc<dyn JobHandler>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            handler,
            clock,
            config,
        }
    }

    /// ## Summary
    /// Runs the polling loop until `shutdown` resolves. Jobs left
    /// running by a previous process are released back to pending
    /// before the first poll.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        self.recover_abandoned().await;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "queue worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.drain_due().await,
                _ = shutdown.changed() => {
                    tracing::info!("queue worker shutting down");
                    break;
                }
            }
        }
    }

    /// ## Summary
    /// Releases jobs stuck in the running state back to pending. No live
    /// task in this process holds a claim yet when this runs, so every
    /// running row belongs to a claim that died unresolved.
    pub async fn recover_abandoned(&self) {
        match self.jobs.release_stuck(self.clock.now()).await {
            Ok(0) => {}
            Ok(released) => {
                tracing::warn!(released, "released jobs abandoned mid-execution");
            }
            Err(err) => tracing::error!(%err, "failed to release abandoned jobs"),
        }
    }

    /// One poll: claim due jobs and dispatch each on its own task.
    pub async fn drain_due(&self) {
        let now = self.clock.now();
        let claimed = match self.jobs.claim_due(now, self.config.batch_size).await {
            Ok(claimed) => claimed,
            Err(err) => {
                tracing::error!(%err, "failed to claim due jobs");
                return;
            }
        };
        if claimed.is_empty() {
            return;
        }
        tracing::debug!(count = claimed.len(), "claimed due jobs");

        let mut tasks = Vec::with_capacity(claimed.len());
        for job in claimed {
            let jobs = Arc::clone(&self.jobs);
            let handler = Arc::clone(&self.handler);
            let clock = Arc::clone(&self.clock);
            let retry_base = self.config.retry_base;
            tasks.push(tokio::spawn(async move {
                execute(jobs, handler, clock, retry_base, job).await;
            }));
        }
        for task in tasks {
            if let Err(err) = task.await {
                tracing::error!(%err, "job task panicked");
            }
        }
    }
}

#[tracing::instrument(skip_all, fields(job_id = %job.id, kind = %job.kind, attempts = job.attempts))]
async fn execute(
    jobs: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    clock: Arc<dyn Clock>,
    retry_base: chrono::Duration,
    job: JobRecord,
) {
    match handler.handle(&job).await {
        Ok(()) => {
            if let Err(err) = jobs.mark_done(&job.id).await {
                tracing::error!(%err, "failed to mark job done");
            }
        }
        Err(handler_err) => {
            let attempt = job.attempts + 1;
            if attempt >= job.max_attempts {
                tracing::error!(%handler_err, attempt, "job exhausted retries, dropping");
                if let Err(err) = jobs.mark_failed(&job.id, &handler_err.to_string()).await {
                    tracing::error!(%err, "failed to mark job failed");
                }
            } else {
                let delay = retry_delay(retry_base, job.attempts);
                let next = clock.now() + delay;
                tracing::warn!(%handler_err, attempt, retry_at = %next, "job failed, retrying");
                if let Err(err) = jobs
                    .retry_later(&job.id, next, &handler_err.to_string())
                    .await
                {
                    tracing::error!(%err, "failed to re-queue job for retry");
                }
            }
        }
    }
}

/// Exponential backoff: `base * 2^attempts`, saturating on overflow.
#[must_use]
pub fn retry_delay(base: chrono::Duration, attempts: i32) -> chrono::Duration {
    let shift = u32::try_from(attempts.clamp(0, 30)).unwrap_or(0);
    base.checked_mul(1_i32 << shift).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::retry_delay;
    use chrono::Duration;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::seconds(60);
        assert_eq!(retry_delay(base, 0), Duration::seconds(60));
        assert_eq!(retry_delay(base, 1), Duration::seconds(120));
        assert_eq!(retry_delay(base, 2), Duration::seconds(240));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let base = Duration::seconds(60);
        let big = retry_delay(base, 1000);
        assert!(big >= retry_delay(base, 30));
    }

    #[test]
    fn backoff_treats_negative_attempts_as_zero() {
        let base = Duration::seconds(60);
        assert_eq!(retry_delay(base, -3), Duration::seconds(60));
    }
}
