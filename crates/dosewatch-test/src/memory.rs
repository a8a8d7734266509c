//! In-memory implementations of the collaborator contracts.
//!
//! These mirror the transactional semantics of the PostgreSQL
//! implementations: single atomic update-by-id mutations, the
//! escalation guard on a still-pending aggregate, and the one-shot
//! parent-notification compare-and-set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use dosewatch_core::clock::Clock;
use dosewatch_core::error::{StoreError, StoreResult};
use dosewatch_core::store::{
    JobRecord, JobState, JobStore, NewJob, NotificationDispatcher, ReminderStore, UserDirectory,
};
use dosewatch_core::types::{
    AggregateStatus, DoseStatus, MarkOutcome, MedicineDose, NewReminderOccurrence,
    ReminderOccurrence, UserContact, aggregate_status,
};

use crate::clock::lock;

pub struct MemoryReminderStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<Uuid, ReminderOccurrence>>,
}

impl MemoryReminderStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Direct read for assertions.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<ReminderOccurrence> {
        lock(&self.inner).get(&id).cloned()
    }

    /// Direct insert for fixtures that need full control of the record.
    pub fn insert(&self, occurrence: ReminderOccurrence) {
        lock(&self.inner).insert(occurrence.id, occurrence);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// All occurrences for one user, ordered by fire time.
    #[must_use]
    pub fn for_user(&self, user_id: Uuid) -> Vec<ReminderOccurrence> {
        let mut found: Vec<ReminderOccurrence> = lock(&self.inner)
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|o| o.fire_time);
        found
    }
}

#[async_trait]
impl ReminderStore for MemoryReminderStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ReminderOccurrence>> {
        Ok(self.get(id))
    }

    async fn find_schedulable_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> StoreResult<Vec<ReminderOccurrence>> {
        let mut found: Vec<ReminderOccurrence> = lock(&self.inner)
            .values()
            .filter(|o| o.status.is_schedulable())
            .filter(|o| user_id.is_none_or(|u| o.user_id == u))
            .filter(|o| {
                // The window start doubles as the evaluation instant, so
                // an elapsed snooze falls back to the base fire time.
                let effective = o.effective_fire_time(start);
                start <= effective && effective <= end
            })
            .cloned()
            .collect();
        found.sort_by_key(|o| o.effective_fire_time(start));
        Ok(found)
    }

    async fn create(&self, new: NewReminderOccurrence) -> StoreResult<ReminderOccurrence> {
        let now = self.clock.now();
        let mut inner = lock(&self.inner);
        if let Some(existing) = inner.get(&new.id) {
            return Ok(existing.clone());
        }
        let occurrence = ReminderOccurrence {
            id: new.id,
            user_id: new.user_id,
            medicines: new
                .medicines
                .into_iter()
                .map(|m| MedicineDose::pending(m.medicine_id, m.name))
                .collect(),
            scheduled_start: new.scheduled_start,
            scheduled_end: new.scheduled_end,
            fire_time: new.fire_time,
            snoozed_until: None,
            missed_at: None,
            repeat: new.repeat,
            status: AggregateStatus::Pending,
            notification_sent: false,
            notification_count: 0,
            parent_notified: false,
            created_at: now,
            updated_at: now,
        };
        inner.insert(occurrence.id, occurrence.clone());
        Ok(occurrence)
    }

    async fn mark_item(
        &self,
        id: Uuid,
        item_index: usize,
        status: DoseStatus,
        marked_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> StoreResult<MarkOutcome> {
        let mut inner = lock(&self.inner);
        let occurrence = inner
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("reminder", id))?;
        let Some(item) = occurrence.medicines.get_mut(item_index) else {
            return Err(StoreError::InvalidData(format!(
                "medicine index {item_index} out of range (have {})",
                occurrence.medicines.len()
            )));
        };
        item.status = status;
        item.marked_by = marked_by;
        item.marked_at = Some(now);

        let statuses: Vec<DoseStatus> = occurrence.item_statuses().collect();
        let aggregate = aggregate_status(&statuses);
        let late_correction =
            occurrence.missed_at.is_some() && aggregate != AggregateStatus::Missed;
        if late_correction {
            occurrence.missed_at = None;
        }
        occurrence.status = aggregate;
        occurrence.updated_at = now;

        Ok(MarkOutcome {
            occurrence: occurrence.clone(),
            late_correction,
        })
    }

    async fn set_snoozed(
        &self,
        id: Uuid,
        until: DateTime<Utc>,
    ) -> StoreResult<ReminderOccurrence> {
        let mut inner = lock(&self.inner);
        let occurrence = inner
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("reminder", id))?;
        occurrence.status = AggregateStatus::Snoozed;
        occurrence.snoozed_until = Some(until);
        occurrence.updated_at = self.clock.now();
        Ok(occurrence.clone())
    }

    async fn resume_from_snooze(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = lock(&self.inner);
        let Some(occurrence) = inner.get_mut(&id) else {
            return Ok(false);
        };
        if occurrence.status != AggregateStatus::Snoozed {
            return Ok(false);
        }
        occurrence.status = AggregateStatus::Pending;
        occurrence.snoozed_until = None;
        occurrence.updated_at = now;
        Ok(true)
    }

    async fn escalate_to_missed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ReminderOccurrence>> {
        let mut inner = lock(&self.inner);
        let Some(occurrence) = inner.get_mut(&id) else {
            return Ok(None);
        };
        if occurrence.status != AggregateStatus::Pending {
            return Ok(None);
        }
        for item in &mut occurrence.medicines {
            if item.status == DoseStatus::Pending {
                item.status = DoseStatus::Missed;
                item.marked_at = Some(now);
            }
        }
        occurrence.status = AggregateStatus::Missed;
        occurrence.missed_at = Some(now);
        occurrence.updated_at = now;
        Ok(Some(occurrence.clone()))
    }

    async fn record_notification_attempt(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = lock(&self.inner);
        let occurrence = inner
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("reminder", id))?;
        occurrence.notification_sent = true;
        occurrence.notification_count += 1;
        occurrence.updated_at = self.clock.now();
        Ok(())
    }

    async fn claim_parent_notification(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = lock(&self.inner);
        let Some(occurrence) = inner.get_mut(&id) else {
            return Ok(false);
        };
        if occurrence.parent_notified {
            return Ok(false);
        }
        occurrence.parent_notified = true;
        occurrence.updated_at = self.clock.now();
        Ok(true)
    }

    async fn delete_by_id(&self, id: Uuid) -> StoreResult<bool> {
        Ok(lock(&self.inner).remove(&id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<HashMap<String, JobRecord>>,
    /// When each running job was claimed, for stale-claim recovery.
    claimed_at: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn job(&self, job_id: &str) -> Option<JobRecord> {
        lock(&self.inner).get(job_id).cloned()
    }

    /// All jobs, ordered by fire time then id for stable assertions.
    #[must_use]
    pub fn all(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = lock(&self.inner).values().cloned().collect();
        jobs.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    #[must_use]
    pub fn in_state(&self, state: JobState) -> Vec<JobRecord> {
        self.all().into_iter().filter(|j| j.state == state).collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert_pending(&self, job: NewJob) -> StoreResult<()> {
        let mut inner = lock(&self.inner);
        if inner
            .get(&job.id)
            .is_some_and(|existing| existing.state == JobState::Running)
        {
            return Ok(());
        }
        inner.insert(
            job.id.clone(),
            JobRecord {
                id: job.id,
                kind: job.kind,
                reminder_id: job.reminder_id,
                fire_at: job.fire_at,
                state: JobState::Pending,
                attempts: 0,
                max_attempts: job.max_attempts,
                last_error: None,
            },
        );
        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> StoreResult<bool> {
        let mut inner = lock(&self.inner);
        match inner.get_mut(job_id) {
            Some(job) if job.state == JobState::Pending => {
                job.state = JobState::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<JobRecord>> {
        let mut inner = lock(&self.inner);
        let mut due: Vec<String> = inner
            .values()
            .filter(|j| j.state == JobState::Pending && j.fire_at <= now)
            .map(|j| j.id.clone())
            .collect();
        due.sort();
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(job) = inner.get_mut(&id) {
                job.state = JobState::Running;
                claimed.push(job.clone());
            }
        }
        let mut claim_log = lock(&self.claimed_at);
        for job in &claimed {
            claim_log.insert(job.id.clone(), now);
        }
        Ok(claimed)
    }

    async fn release_stuck(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let claims = lock(&self.claimed_at).clone();
        let mut inner = lock(&self.inner);
        let mut released = 0;
        for job in inner.values_mut() {
            if job.state == JobState::Running
                && claims.get(&job.id).is_none_or(|at| *at <= cutoff)
            {
                job.state = JobState::Pending;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn mark_done(&self, job_id: &str) -> StoreResult<()> {
        if let Some(job) = lock(&self.inner).get_mut(job_id) {
            job.state = JobState::Done;
        }
        Ok(())
    }

    async fn retry_later(
        &self,
        job_id: &str,
        next_fire_at: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<()> {
        if let Some(job) = lock(&self.inner).get_mut(job_id) {
            job.attempts += 1;
            job.state = JobState::Pending;
            job.fire_at = next_fire_at;
            job.last_error = Some(error.to_owned());
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: &str, error: &str) -> StoreResult<()> {
        if let Some(job) = lock(&self.inner).get_mut(job_id) {
            job.attempts += 1;
            job.state = JobState::Failed;
            job.last_error = Some(error.to_owned());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserDirectory {
    contacts: Mutex<HashMap<Uuid, UserContact>>,
    guardians: Mutex<HashMap<Uuid, Uuid>>,
}

impl MemoryUserDirectory {
    pub fn add_contact(&self, contact: UserContact) {
        lock(&self.contacts).insert(contact.user_id, contact);
    }

    pub fn link_guardian(&self, user_id: Uuid, guardian_id: Uuid) {
        lock(&self.guardians).insert(user_id, guardian_id);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn contact(&self, user_id: Uuid) -> StoreResult<Option<UserContact>> {
        Ok(lock(&self.contacts).get(&user_id).cloned())
    }

    async fn guardian_of(&self, user_id: Uuid) -> StoreResult<Option<UserContact>> {
        let guardian_id = lock(&self.guardians).get(&user_id).copied();
        Ok(guardian_id.and_then(|id| lock(&self.contacts).get(&id).cloned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Sms,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Channel,
    pub user_id: Uuid,
    pub subject: Option<String>,
    pub message: String,
}

/// Dispatcher that records every delivery and can be toggled to fail.
#[derive(Default)]
pub struct RecordingDispatcher {
    deliveries: Mutex<Vec<Delivery>>,
    fail_all: AtomicBool,
}

impl RecordingDispatcher {
    /// Makes every subsequent send report failure (still recorded).
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        lock(&self.deliveries).clone()
    }

    #[must_use]
    pub fn deliveries_for(&self, user_id: Uuid) -> Vec<Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.user_id == user_id)
            .collect()
    }

    fn record(&self, channel: Channel, user_id: Uuid, subject: Option<&str>, message: &str) -> bool {
        lock(&self.deliveries).push(Delivery {
            channel,
            user_id,
            subject: subject.map(ToOwned::to_owned),
            message: message.to_owned(),
        });
        !self.fail_all.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send_push(&self, target: &UserContact, message: &str) -> bool {
        self.record(Channel::Push, target.user_id, None, message)
    }

    async fn send_sms(&self, target: &UserContact, message: &str) -> bool {
        self.record(Channel::Sms, target.user_id, None, message)
    }

    async fn send_email(&self, target: &UserContact, subject: &str, message: &str) -> bool {
        self.record(Channel::Email, target.user_id, Some(subject), message)
    }
}
