//! Reminder scheduling engine.
//!
//! Drives the full occurrence lifecycle: priming fire jobs over a
//! horizon, dispatching notifications when a job fires, escalating
//! unactioned reminders after the grace window, snoozing, dose marking
//! and recurrence generation. All effects go through the collaborator
//! contracts; every handler re-checks persisted state before acting
//! because job delivery is at-least-once.

pub mod recurrence;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use dosewatch_core::clock::Clock;
use dosewatch_core::config::SchedulerConfig;
use dosewatch_core::store::{JobKind, JobRecord, ReminderStore, UserDirectory};
use dosewatch_core::types::{AggregateStatus, DoseStatus, MarkOutcome, ReminderOccurrence};

use crate::error::{ServiceError, ServiceResult};
use crate::notify::Notifier;
use crate::queue::JobQueue;
use crate::queue::worker::JobHandler;

pub struct ReminderScheduler {
    reminders: Arc<dyn ReminderStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Notifier,
    queue: JobQueue,
    clock: Arc<dyn Clock>,
    grace_window: chrono::Duration,
    prime_horizon: chrono::Duration,
}

impl ReminderScheduler {
    #[must_use]
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Notifier,
        queue: JobQueue,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            reminders,
            users,
            notifier,
            queue,
            clock,
            grace_window: config.grace_window(),
            prime_horizon: config.prime_horizon(),
        }
    }

    /// ## Summary
    /// Enqueues the fire job for one occurrence at its effective fire
    /// time. Non-schedulable statuses and past fire times are skipped
    /// with a log line; returns whether a job was enqueued.
    ///
    /// ## Errors
    /// Returns an error when the job store write fails.
    #[tracing::instrument(skip(self, occurrence), fields(reminder_id = %occurrence.id))]
    pub async fn schedule_one(&self, occurrence: &ReminderOccurrence) -> ServiceResult<bool> {
        if !occurrence.status.is_schedulable() {
            tracing::debug!(status = %occurrence.status, "occurrence not schedulable, skipping");
            return Ok(false);
        }
        let fire_at = occurrence.effective_fire_time(self.clock.now());
        self.queue.schedule_fire(occurrence.id, fire_at).await
    }

    /// ## Summary
    /// Schedules every schedulable occurrence whose effective fire time
    /// falls in `[start, end]`, optionally for one user. Returns the
    /// number of jobs enqueued.
    ///
    /// ## Errors
    /// Returns an error when the range query or a job write fails.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> ServiceResult<usize> {
        let occurrences = self
            .reminders
            .find_schedulable_in_range(start, end, user_id)
            .await?;
        let mut scheduled = 0;
        for occurrence in &occurrences {
            if self.schedule_one(occurrence).await? {
                scheduled += 1;
            }
        }
        tracing::info!(found = occurrences.len(), scheduled, "primed range");
        Ok(scheduled)
    }

    /// ## Summary
    /// Primes the upcoming horizon for a single user. Hook for
    /// post-login and post-creation flows.
    ///
    /// ## Errors
    /// Returns an error when the range query or a job write fails.
    pub async fn schedule_for_user(&self, user_id: Uuid) -> ServiceResult<usize> {
        let now = self.clock.now();
        self.schedule_range(now, now + self.prime_horizon, Some(user_id))
            .await
    }

    /// ## Summary
    /// Primes the upcoming horizon for all users. Called at process
    /// start and from the periodic refresh loops.
    ///
    /// ## Errors
    /// Returns an error when the range query or a job write fails.
    pub async fn initialize(&self) -> ServiceResult<usize> {
        let now = self.clock.now();
        self.schedule_range(now, now + self.prime_horizon, None).await
    }

    /// ## Summary
    /// Fire handler: returns a snoozed occurrence to pending, notifies
    /// the user, arms the missed-check, and materializes the next
    /// occurrence of a recurring series.
    ///
    /// Deleted or already-actioned occurrences are a no-op; the
    /// deterministic missed-check id makes re-delivery harmless.
    ///
    /// ## Errors
    /// Returns an error when a store write fails, so the queue can
    /// retry the whole (idempotent) handler.
    #[tracing::instrument(skip(self))]
    pub async fn on_fire(&self, reminder_id: Uuid) -> ServiceResult<()> {
        let Some(occurrence) = self.reminders.find_by_id(reminder_id).await? else {
            tracing::debug!("occurrence gone before firing, nothing to do");
            return Ok(());
        };
        if !occurrence.status.is_schedulable() {
            tracing::debug!(status = %occurrence.status, "occurrence already actioned, nothing to do");
            return Ok(());
        }

        let now = self.clock.now();
        if occurrence.status == AggregateStatus::Snoozed {
            // A snoozed fire re-arms the occurrence; left snoozed, the
            // escalation guard would never mark it missed.
            self.reminders.resume_from_snooze(reminder_id, now).await?;
        }

        if let Some(contact) = self.users.contact(occurrence.user_id).await? {
            let message = self.notifier.render_due(&occurrence);
            if self
                .notifier
                .dispatch(&contact, Notifier::due_subject(), &message)
                .await
            {
                self.reminders.record_notification_attempt(reminder_id).await?;
            }
        } else {
            tracing::warn!(user_id = %occurrence.user_id, "no contact record, skipping delivery");
        }

        // Grace runs from the moment the reminder actually went out; a
        // late-claimed job still gives the user the full window.
        let check_at = occurrence.effective_fire_time(now) + self.grace_window;
        let check_at = check_at.max(now + self.grace_window);
        self.queue
            .schedule_missed_check(reminder_id, check_at)
            .await?;

        if occurrence.repeat.is_recurring() {
            if let Some(next) = recurrence::next_occurrence(&occurrence) {
                let created = self.reminders.create(next).await?;
                tracing::info!(next_id = %created.id, fire_time = %created.fire_time, "materialized next occurrence");
                self.schedule_one(&created).await?;
            } else {
                tracing::debug!("series reached its end");
            }
        }
        Ok(())
    }

    /// ## Summary
    /// Missed-check handler: escalates a still-pending occurrence to
    /// missed and notifies the guardian at most once.
    ///
    /// ## Errors
    /// Returns an error when a store write fails.
    #[tracing::instrument(skip(self))]
    pub async fn on_missed_check(&self, reminder_id: Uuid) -> ServiceResult<()> {
        let Some(occurrence) = self.reminders.find_by_id(reminder_id).await? else {
            tracing::debug!("occurrence gone before missed-check, nothing to do");
            return Ok(());
        };

        let now = self.clock.now();
        let Some(escalated) = self.reminders.escalate_to_missed(reminder_id, now).await? else {
            tracing::debug!(status = %occurrence.status, "occurrence actioned within grace, no escalation");
            return Ok(());
        };
        tracing::info!(missed_at = %now, "escalated unactioned occurrence to missed");

        let Some(guardian) = self.users.guardian_of(escalated.user_id).await? else {
            return Ok(());
        };
        // The compare-and-set makes redelivered checks notify at most
        // once; losing the claim means another attempt already did.
        if !self.reminders.claim_parent_notification(reminder_id).await? {
            tracing::debug!("guardian already notified for this occurrence");
            return Ok(());
        }

        let patient_name = self
            .users
            .contact(escalated.user_id)
            .await?
            .map_or_else(|| "Your charge".to_owned(), |c| c.name);
        let message = self.notifier.render_missed(&escalated, &patient_name);
        if !self
            .notifier
            .dispatch(&guardian, Notifier::missed_subject(), &message)
            .await
        {
            // Best effort by contract; the missed status is already
            // durable.
            tracing::warn!(guardian_id = %guardian.user_id, "guardian had no reachable channel");
        }
        Ok(())
    }

    /// ## Summary
    /// Cancels both outstanding jobs for an occurrence.
    ///
    /// ## Errors
    /// Returns an error when a job store write fails.
    pub async fn cancel(&self, reminder_id: Uuid) -> ServiceResult<()> {
        self.queue.cancel_for_reminder(reminder_id).await
    }

    /// ## Summary
    /// Snoozes an occurrence by `minutes`: sets the snoozed status and
    /// override instant, drops the old fire job and arms a new one.
    ///
    /// ## Errors
    /// Returns a validation error for a non-positive duration, not-found
    /// when the occurrence does not exist, or a store error.
    #[tracing::instrument(skip(self))]
    pub async fn snooze(
        &self,
        reminder_id: Uuid,
        minutes: i64,
    ) -> ServiceResult<ReminderOccurrence> {
        if minutes <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "snooze duration must be positive, got {minutes} minutes"
            )));
        }
        let until = self.clock.now() + chrono::Duration::minutes(minutes);
        let occurrence = self.reminders.set_snoozed(reminder_id, until).await?;
        self.queue
            .cancel(&dosewatch_core::constants::fire_job_id(reminder_id))
            .await?;
        self.queue.schedule_fire(reminder_id, until).await?;
        tracing::info!(%until, "occurrence snoozed");
        Ok(occurrence)
    }

    /// ## Summary
    /// Marks one medicine taken. A taken-mark on an auto-missed
    /// occurrence succeeds and surfaces `late_correction`.
    ///
    /// ## Errors
    /// Returns a validation error for an out-of-range index, not-found
    /// for an unknown occurrence, or a store error.
    pub async fn mark_taken(
        &self,
        reminder_id: Uuid,
        item_index: usize,
        marked_by: Option<Uuid>,
    ) -> ServiceResult<MarkOutcome> {
        self.mark(reminder_id, item_index, DoseStatus::Taken, marked_by)
            .await
    }

    /// ## Summary
    /// Marks one medicine missed by explicit user action.
    ///
    /// ## Errors
    /// Returns a validation error for an out-of-range index, not-found
    /// for an unknown occurrence, or a store error.
    pub async fn mark_missed(
        &self,
        reminder_id: Uuid,
        item_index: usize,
        marked_by: Option<Uuid>,
    ) -> ServiceResult<MarkOutcome> {
        self.mark(reminder_id, item_index, DoseStatus::Missed, marked_by)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn mark(
        &self,
        reminder_id: Uuid,
        item_index: usize,
        status: DoseStatus,
        marked_by: Option<Uuid>,
    ) -> ServiceResult<MarkOutcome> {
        let now = self.clock.now();
        let outcome = self
            .reminders
            .mark_item(reminder_id, item_index, status, marked_by, now)
            .await
            .map_err(|err| match err {
                dosewatch_core::error::StoreError::InvalidData(msg) => {
                    ServiceError::ValidationError(msg)
                }
                other => ServiceError::from(other),
            })?;
        if outcome.late_correction {
            tracing::info!(%status, "late correction cleared the missed escalation");
        }
        Ok(outcome)
    }
}

#[async_trait]
impl JobHandler for ReminderScheduler {
    async fn handle(&self, job: &JobRecord) -> ServiceResult<()> {
        match job.kind {
            JobKind::Fire => self.on_fire(job.reminder_id).await,
            JobKind::MissedCheck => self.on_missed_check(job.reminder_id).await,
        }
    }
}
