//! Durable delayed job queue.
//!
//! Jobs are persisted through the [`JobStore`] contract under ids derived
//! deterministically from the reminder id, so scheduling is idempotent
//! and cancellation never depends on in-memory state. The polling worker
//! lives in [`worker`].

pub mod worker;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use dosewatch_core::clock::Clock;
use dosewatch_core::constants::{fire_job_id, missed_check_job_id};
use dosewatch_core::store::{JobKind, JobStore, NewJob};

use crate::error::ServiceResult;

/// Handle for enqueueing and cancelling delayed jobs.
#[derive(Clone)]
pub struct JobQueue {
    jobs: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    max_attempts: i32,
}

impl JobQueue {
    #[must_use]
    pub fn new(jobs: Arc<dyn JobStore>, clock: Arc<dyn Clock>, max_attempts: i32) -> Self {
        Self {
            jobs,
            clock,
            max_attempts,
        }
    }

    /// ## Summary
    /// Enqueues (or idempotently re-enqueues) the fire job for a reminder.
    ///
    /// Returns `false` without enqueueing when `fire_at` is already in the
    /// past; stale reminders must never re-fire on restart.
    ///
    /// ## Errors
    /// Returns an error when the job store write fails.
    pub async fn schedule_fire(
        &self,
        reminder_id: Uuid,
        fire_at: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        self.schedule(fire_job_id(reminder_id), JobKind::Fire, reminder_id, fire_at)
            .await
    }

    /// ## Summary
    /// Enqueues the missed-check job that re-examines a reminder after
    /// its grace window.
    ///
    /// ## Errors
    /// Returns an error when the job store write fails.
    pub async fn schedule_missed_check(
        &self,
        reminder_id: Uuid,
        fire_at: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        self.schedule(
            missed_check_job_id(reminder_id),
            JobKind::MissedCheck,
            reminder_id,
            fire_at,
        )
        .await
    }

    #[tracing::instrument(skip(self), fields(%job_id, %fire_at))]
    async fn schedule(
        &self,
        job_id: String,
        kind: JobKind,
        reminder_id: Uuid,
        fire_at: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        let now = self.clock.now();
        if fire_at <= now {
            tracing::warn!(%reminder_id, %fire_at, %now, "fire time in the past, skipping job");
            return Ok(false);
        }

        self.jobs
            .upsert_pending(NewJob {
                id: job_id,
                kind,
                reminder_id,
                fire_at,
                max_attempts: self.max_attempts,
            })
            .await?;
        Ok(true)
    }

    /// ## Summary
    /// Cancels a single job by id. Idempotent; absent or already-running
    /// jobs are left untouched.
    ///
    /// ## Errors
    /// Returns an error when the job store write fails.
    pub async fn cancel(&self, job_id: &str) -> ServiceResult<bool> {
        Ok(self.jobs.cancel(job_id).await?)
    }

    /// ## Summary
    /// Cancels both outstanding jobs (fire and missed-check) for a
    /// reminder.
    ///
    /// ## Errors
    /// Returns an error when a job store write fails.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_for_reminder(&self, reminder_id: Uuid) -> ServiceResult<()> {
        self.jobs.cancel(&fire_job_id(reminder_id)).await?;
        self.jobs.cancel(&missed_check_job_id(reminder_id)).await?;
        Ok(())
    }
}
