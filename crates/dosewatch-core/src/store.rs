//! Collaborator contracts consumed by the scheduling engine.
//!
//! The engine never talks to a database, a push gateway, or an SMS
//! provider directly; it talks to these traits. `dosewatch-db` provides
//! the PostgreSQL implementations, `dosewatch-test` the in-memory ones.
//!
//! Every mutating store operation is a single atomic update-by-id whose
//! new state is computed from a freshly read record inside the
//! implementation. Multi-step read-modify-write races are not acceptable;
//! the one-shot guards (`claim_parent_notification`) are
//! compare-and-set operations for the same reason.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    DoseStatus, MarkOutcome, NewReminderOccurrence, ReminderOccurrence, UserContact,
};

/// Kind of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Dispatch the reminder notification at `fire_at`.
    Fire,
    /// Re-examine the occurrence after the grace window.
    MissedCheck,
}

impl JobKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fire => "fire",
            Self::MissedCheck => "missed_check",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable delayed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Deterministic id, derived from the reminder id (see
    /// [`crate::constants`]).
    pub id: String,
    pub kind: JobKind,
    pub reminder_id: Uuid,
    pub fire_at: DateTime<Utc>,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
}

/// Input for enqueueing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub id: String,
    pub kind: JobKind,
    pub reminder_id: Uuid,
    pub fire_at: DateTime<Utc>,
    pub max_attempts: i32,
}

/// Durable record of reminder occurrences.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Loads one occurrence.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ReminderOccurrence>>;

    /// Occurrences whose effective fire time falls in `[start, end]` with
    /// a schedulable status (pending or snoozed), optionally filtered to
    /// one user. `start` is the evaluation instant for snooze overrides:
    /// an already-elapsed snooze falls back to the base fire time (see
    /// [`ReminderOccurrence::effective_fire_time`]).
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn find_schedulable_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> StoreResult<Vec<ReminderOccurrence>>;

    /// Persists a new occurrence with all items pending. Idempotent on
    /// the caller-chosen id: an occurrence already stored under it is
    /// returned unchanged.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn create(&self, new: NewReminderOccurrence) -> StoreResult<ReminderOccurrence>;

    /// Marks one item and recomputes the aggregate status atomically.
    ///
    /// Clears `missed_at` (and reports a late correction) when a
    /// taken-mark upgrades an occurrence escalation had auto-missed.
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown occurrence, `InvalidData` for an
    /// out-of-range item index, or a backend error.
    async fn mark_item(
        &self,
        id: Uuid,
        item_index: usize,
        status: DoseStatus,
        marked_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> StoreResult<MarkOutcome>;

    /// Sets the snoozed status and `snoozed_until` override.
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown occurrence or a backend error.
    async fn set_snoozed(
        &self,
        id: Uuid,
        until: DateTime<Utc>,
    ) -> StoreResult<ReminderOccurrence>;

    /// Returns a snoozed occurrence to pending, clearing the
    /// `snoozed_until` override so the grace check can escalate it.
    /// Returns false when the occurrence was not snoozed (no-op).
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn resume_from_snooze(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Escalation write: if the aggregate is still pending, force all
    /// pending items to missed, set the aggregate missed and `missed_at`.
    /// Returns `None` when the occurrence was already actioned (no-op).
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn escalate_to_missed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ReminderOccurrence>>;

    /// Bumps `notification_count` and sets `notification_sent`.
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown occurrence or a backend error.
    async fn record_notification_attempt(&self, id: Uuid) -> StoreResult<()>;

    /// One-shot compare-and-set of `parent_notified` false -> true.
    /// Returns true only for the caller that performed the flip.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn claim_parent_notification(&self, id: Uuid) -> StoreResult<bool>;

    /// Removes an occurrence. Returns false when it did not exist.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn delete_by_id(&self, id: Uuid) -> StoreResult<bool>;
}

/// Durable backing table for the delayed job queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts the job, or overwrites `fire_at`/attempts when a job with
    /// the same id is still pending. Running, done, failed or cancelled
    /// jobs are replaced by a fresh pending row only via their
    /// deterministic id being reused here.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn upsert_pending(&self, job: NewJob) -> StoreResult<()>;

    /// Cancels a job that has not started executing. Idempotent; returns
    /// false when there was nothing pending to cancel.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn cancel(&self, job_id: &str) -> StoreResult<bool>;

    /// Atomically claims up to `limit` due pending jobs, transitioning
    /// them to running. A claimed id can not be claimed again until it is
    /// re-queued, which is what keeps a single job from being
    /// concurrently re-entered.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<JobRecord>>;

    /// Returns running jobs last touched at or before `cutoff` to
    /// pending. Recovery for claims a dead process never resolved;
    /// returns how many jobs were released.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn release_stuck(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;

    /// Marks a running job done.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn mark_done(&self, job_id: &str) -> StoreResult<()>;

    /// Re-queues a running job for a retry at `next_fire_at`, recording
    /// the attempt and the error.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn retry_later(
        &self,
        job_id: &str,
        next_fire_at: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<()>;

    /// Terminal failure after exhausted retries.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn mark_failed(&self, job_id: &str, error: &str) -> StoreResult<()>;
}

/// Outbound notification transports, one call per channel.
///
/// Each channel is independently callable and independently fallible; a
/// `false` return means the delivery attempt failed. Timeouts and retries
/// inside a transport are the dispatcher's concern, not the engine's.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_push(&self, target: &UserContact, message: &str) -> bool;
    async fn send_sms(&self, target: &UserContact, message: &str) -> bool;
    async fn send_email(&self, target: &UserContact, subject: &str, message: &str) -> bool;
}

/// Read-only view of users and their guardian links.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Channel preferences and addresses for a user.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn contact(&self, user_id: Uuid) -> StoreResult<Option<UserContact>>;

    /// The linked guardian contact, if any.
    ///
    /// ## Errors
    /// Returns an error when the backing store fails.
    async fn guardian_of(&self, user_id: Uuid) -> StoreResult<Option<UserContact>>;
}
