//! PostgreSQL implementations of the collaborator contracts.
//!
//! Every mutation is a single guarded statement or a short transaction
//! whose new state is computed from a freshly read, row-locked record.
//! The engine's idempotence relies on these being the only mutation
//! points for occurrence state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel_async::AsyncConnection;
use diesel_async::scoped_futures::ScopedFutureExt;
use uuid::Uuid;

use dosewatch_core::error::{StoreError, StoreResult};
use dosewatch_core::store::{JobRecord, JobStore, NewJob, ReminderStore, UserDirectory};
use dosewatch_core::types::{
    DoseStatus, MarkOutcome, NewReminderOccurrence, ReminderOccurrence, UserContact,
    aggregate_status,
};

use crate::db::connection::{DbConnection, DbPool};
use crate::db::enums;
use crate::db::query::{job, reminder, user};
use crate::model::job::NewScheduledJob;
use crate::model::reminder::{NewReminder, NewReminderMedicine, rule_columns};

fn backend(err: impl Into<crate::error::DbError>) -> StoreError {
    StoreError::from(err.into())
}

/// Reminder occurrence store backed by the shared connection pool.
#[derive(Clone)]
pub struct PgReminderStore {
    pool: DbPool,
}

impl PgReminderStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<DbConnection<'_>> {
        self.pool.get().await.map_err(backend)
    }
}

/// Loads the full occurrence (row + ordered items) on an open connection.
async fn load_occurrence(
    conn: &mut DbConnection<'_>,
    id: Uuid,
) -> Result<Option<ReminderOccurrence>, diesel::result::Error> {
    let Some(row) = reminder::find_row(conn, id).await? else {
        return Ok(None);
    };
    let items = reminder::medicines(conn, id).await?;
    Ok(Some(row.into_occurrence(items)))
}

/// Transaction outcome for `mark_item`, mapped to the trait result
/// outside the closure so the closure's error type stays diesel's.
enum MarkTx {
    NotFound,
    BadIndex(usize),
    Marked(Box<MarkOutcome>),
}

#[async_trait]
impl ReminderStore for PgReminderStore {
    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ReminderOccurrence>> {
        let mut conn = self.conn().await?;
        load_occurrence(&mut conn, id).await.map_err(backend)
    }

    #[tracing::instrument(skip(self))]
    async fn find_schedulable_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> StoreResult<Vec<ReminderOccurrence>> {
        let mut conn = self.conn().await?;
        let rows = reminder::schedulable_in_range(&mut conn, start, end, user_id)
            .await
            .map_err(backend)?;

        let mut occurrences = Vec::with_capacity(rows.len());
        for row in rows {
            let items = reminder::medicines(&mut conn, row.id).await.map_err(backend)?;
            occurrences.push(row.into_occurrence(items));
        }
        Ok(occurrences)
    }

    #[tracing::instrument(skip(self, new), fields(reminder_id = %new.id, fire_time = %new.fire_time))]
    async fn create(&self, new: NewReminderOccurrence) -> StoreResult<ReminderOccurrence> {
        let id = new.id;
        let (repeat_kind, days_of_week, days_of_month, custom_interval, custom_unit) =
            rule_columns(&new.repeat);

        let row = NewReminder {
            id,
            user_id: new.user_id,
            scheduled_start: new.scheduled_start,
            scheduled_end: new.scheduled_end,
            fire_time: new.fire_time,
            repeat_kind,
            days_of_week,
            days_of_month,
            custom_interval,
            custom_unit,
            status: enums::AggregateStatus::Pending,
        };
        let items: Vec<NewReminderMedicine> = new
            .medicines
            .iter()
            .enumerate()
            .map(|(position, medicine)| NewReminderMedicine {
                reminder_id: id,
                position: i32::try_from(position).unwrap_or(i32::MAX),
                medicine_id: medicine.medicine_id,
                name: medicine.name.clone(),
                status: enums::DoseStatus::Pending,
            })
            .collect();

        let mut conn = self.conn().await?;
        let created = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    // Zero rows means the id already exists; the load
                    // below returns that occurrence unchanged.
                    reminder::insert(conn, &row, &items).await?;
                    load_occurrence(conn, id).await
                }
                .scope_boxed()
            })
            .await
            .map_err(backend)?;

        created.ok_or_else(|| StoreError::not_found("reminder", id))
    }

    #[tracing::instrument(skip(self))]
    async fn mark_item(
        &self,
        id: Uuid,
        item_index: usize,
        status: DoseStatus,
        marked_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> StoreResult<MarkOutcome> {
        let mut conn = self.conn().await?;
        let tx = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let Some(row) = reminder::find_row_for_update(conn, id).await? else {
                        return Ok(MarkTx::NotFound);
                    };
                    let mut items = reminder::medicines(conn, id).await?;
                    if item_index >= items.len() {
                        return Ok(MarkTx::BadIndex(items.len()));
                    }

                    let position = i32::try_from(item_index).unwrap_or(i32::MAX);
                    reminder::update_item(conn, id, position, status.into(), marked_by, now)
                        .await?;

                    items[item_index].status = status.into();
                    items[item_index].marked_by = marked_by;
                    items[item_index].marked_at = Some(now);

                    let statuses: Vec<DoseStatus> =
                        items.iter().map(|i| i.status.into()).collect();
                    let aggregate = aggregate_status(&statuses);

                    // A taken-mark that lifts the occurrence out of the
                    // escalated missed state is a late correction; it
                    // clears `missed_at`.
                    let late_correction = row.missed_at.is_some()
                        && aggregate != dosewatch_core::types::AggregateStatus::Missed;
                    let missed_at = if late_correction { None } else { row.missed_at };

                    reminder::set_aggregate(conn, id, aggregate.into(), missed_at, now).await?;

                    let mut updated = row;
                    updated.status = aggregate.into();
                    updated.missed_at = missed_at;
                    updated.updated_at = now;

                    Ok(MarkTx::Marked(Box::new(MarkOutcome {
                        occurrence: updated.into_occurrence(items),
                        late_correction,
                    })))
                }
                .scope_boxed()
            })
            .await
            .map_err(backend)?;

        match tx {
            MarkTx::NotFound => Err(StoreError::not_found("reminder", id)),
            MarkTx::BadIndex(len) => Err(StoreError::InvalidData(format!(
                "medicine index {item_index} out of range (have {len})"
            ))),
            MarkTx::Marked(outcome) => Ok(*outcome),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn set_snoozed(
        &self,
        id: Uuid,
        until: DateTime<Utc>,
    ) -> StoreResult<ReminderOccurrence> {
        let mut conn = self.conn().await?;
        let updated = reminder::snooze(&mut conn, id, until, Utc::now())
            .await
            .map_err(backend)?;
        if updated == 0 {
            return Err(StoreError::not_found("reminder", id));
        }
        load_occurrence(&mut conn, id)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::not_found("reminder", id))
    }

    #[tracing::instrument(skip(self))]
    async fn resume_from_snooze(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let resumed = reminder::resume_snoozed(&mut conn, id, now)
            .await
            .map_err(backend)?;
        Ok(resumed > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn escalate_to_missed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ReminderOccurrence>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                let escalated = reminder::escalate_if_pending(conn, id, now).await?;
                if escalated == 0 {
                    // Already actioned (or deleted); nothing to do.
                    return Ok(None);
                }
                reminder::force_pending_items_missed(conn, id, now).await?;
                load_occurrence(conn, id).await
            }
            .scope_boxed()
        })
        .await
        .map_err(backend)
    }

    #[tracing::instrument(skip(self))]
    async fn record_notification_attempt(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let updated = reminder::record_notification(&mut conn, id, Utc::now())
            .await
            .map_err(backend)?;
        if updated == 0 {
            return Err(StoreError::not_found("reminder", id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn claim_parent_notification(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let claimed = reminder::claim_parent_notification(&mut conn, id, Utc::now())
            .await
            .map_err(backend)?;
        Ok(claimed > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_by_id(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let deleted = reminder::delete(&mut conn, id).await.map_err(backend)?;
        Ok(deleted > 0)
    }
}

/// Delayed job store backed by the shared connection pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<DbConnection<'_>> {
        self.pool.get().await.map_err(backend)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[tracing::instrument(skip(self, new), fields(job_id = %new.id, fire_at = %new.fire_at))]
    async fn upsert_pending(&self, new: NewJob) -> StoreResult<()> {
        let row = NewScheduledJob {
            id: new.id,
            kind: new.kind.into(),
            reminder_id: new.reminder_id,
            fire_at: new.fire_at,
            state: enums::JobState::Pending,
            attempts: 0,
            max_attempts: new.max_attempts,
        };

        let mut conn = self.conn().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                // Re-arm an existing (non-running) row, else insert. A
                // concurrent insert winning the race leaves the existing
                // row in place, which is the idempotent outcome we want.
                let rearmed = job::rearm(conn, &row, Utc::now()).await?;
                if rearmed == 0 {
                    job::insert_new(conn, &row).await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(backend)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel(&self, job_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let cancelled = job::cancel(&mut conn, job_id, Utc::now())
            .await
            .map_err(backend)?;
        Ok(cancelled > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<JobRecord>> {
        let mut conn = self.conn().await?;
        let claimed = job::claim_due(&mut conn, now, limit).await.map_err(backend)?;
        Ok(claimed.into_iter().map(crate::model::job::ScheduledJob::into_record).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn release_stuck(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut conn = self.conn().await?;
        job::release_stuck(&mut conn, cutoff, Utc::now())
            .await
            .map_err(backend)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_done(&self, job_id: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        job::mark_done(&mut conn, job_id, Utc::now())
            .await
            .map_err(backend)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn retry_later(
        &self,
        job_id: &str,
        next_fire_at: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        job::retry_later(&mut conn, job_id, next_fire_at, error, Utc::now())
            .await
            .map_err(backend)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn mark_failed(&self, job_id: &str, error: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        job::mark_failed(&mut conn, job_id, error, Utc::now())
            .await
            .map_err(backend)?;
        Ok(())
    }
}

/// User directory backed by the shared connection pool.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<DbConnection<'_>> {
        self.pool.get().await.map_err(backend)
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    #[tracing::instrument(skip(self))]
    async fn contact(&self, user_id: Uuid) -> StoreResult<Option<UserContact>> {
        let mut conn = self.conn().await?;
        let row = user::find(&mut conn, user_id).await.map_err(backend)?;
        Ok(row.map(crate::model::user::User::into_contact))
    }

    #[tracing::instrument(skip(self))]
    async fn guardian_of(&self, user_id: Uuid) -> StoreResult<Option<UserContact>> {
        let mut conn = self.conn().await?;
        let row = user::guardian_of(&mut conn, user_id).await.map_err(backend)?;
        Ok(row.map(crate::model::user::User::into_contact))
    }
}
