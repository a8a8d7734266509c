//! Query composition for `reminders` and `reminder_medicines`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::enums::{AggregateStatus, DoseStatus};
use crate::db::schema::{reminder_medicines, reminders};
use crate::model::reminder::{NewReminder, NewReminderMedicine, Reminder, ReminderMedicine};

diesel::define_sql_function! {
    /// COALESCE over the snooze override and a fallback instant.
    fn coalesce(
        snoozed: diesel::sql_types::Nullable<diesel::sql_types::Timestamptz>,
        fallback: diesel::sql_types::Timestamptz
    ) -> diesel::sql_types::Timestamptz;
}

/// ## Summary
/// Inserts a reminder row together with its medicine item rows. An id
/// collision leaves the existing occurrence untouched and skips the
/// items; returns how many reminder rows were actually inserted.
/// Callers are expected to wrap this in a transaction.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn insert(
    conn: &mut DbConnection<'_>,
    reminder: &NewReminder,
    items: &[NewReminderMedicine],
) -> QueryResult<usize> {
    let inserted = diesel::insert_into(reminders::table)
        .values(reminder)
        .on_conflict(reminders::id)
        .do_nothing()
        .execute(conn)
        .await?;

    if inserted > 0 {
        diesel::insert_into(reminder_medicines::table)
            .values(items)
            .execute(conn)
            .await?;
    }
    Ok(inserted)
}

/// ## Summary
/// Loads one reminder row.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_row(conn: &mut DbConnection<'_>, id: Uuid) -> QueryResult<Option<Reminder>> {
    reminders::table
        .find(id)
        .select(Reminder::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Summary
/// Loads one reminder row with a row lock, serializing concurrent status
/// transitions on the same occurrence.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_row_for_update(
    conn: &mut DbConnection<'_>,
    id: Uuid,
) -> QueryResult<Option<Reminder>> {
    reminders::table
        .find(id)
        .select(Reminder::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()
}

/// ## Summary
/// Loads the medicine items of a reminder, ordered by position.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn medicines(
    conn: &mut DbConnection<'_>,
    reminder_id: Uuid,
) -> QueryResult<Vec<ReminderMedicine>> {
    reminder_medicines::table
        .filter(reminder_medicines::reminder_id.eq(reminder_id))
        .order(reminder_medicines::position.asc())
        .select(ReminderMedicine::as_select())
        .load(conn)
        .await
}

/// ## Summary
/// Reminder rows whose effective fire time falls within `[start, end]`
/// and whose status is still schedulable, optionally restricted to one
/// user. `start` doubles as the evaluation instant: a snooze override
/// still ahead of it is the effective time, while an elapsed one falls
/// back to the base fire time, matching
/// `ReminderOccurrence::effective_fire_time`.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn schedulable_in_range(
    conn: &mut DbConnection<'_>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> QueryResult<Vec<Reminder>> {
    let snooze_marker = coalesce(reminders::snoozed_until, start);
    let mut query = reminders::table
        .filter(
            reminders::status.eq_any(vec![AggregateStatus::Pending, AggregateStatus::Snoozed]),
        )
        .filter(
            snooze_marker
                .gt(start)
                .and(coalesce(reminders::snoozed_until, reminders::fire_time).le(end))
                .or(snooze_marker
                    .le(start)
                    .and(reminders::fire_time.between(start, end))),
        )
        .order(reminders::fire_time.asc())
        .select(Reminder::as_select())
        .into_boxed();

    if let Some(user_id) = user_id {
        query = query.filter(reminders::user_id.eq(user_id));
    }

    query.load(conn).await
}

/// ## Summary
/// Writes one medicine item's status and marker bookkeeping.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn update_item(
    conn: &mut DbConnection<'_>,
    reminder_id: Uuid,
    position: i32,
    status: DoseStatus,
    marked_by: Option<Uuid>,
    marked_at: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(
        reminder_medicines::table
            .filter(reminder_medicines::reminder_id.eq(reminder_id))
            .filter(reminder_medicines::position.eq(position)),
    )
    .set((
        reminder_medicines::status.eq(status),
        reminder_medicines::marked_by.eq(marked_by),
        reminder_medicines::marked_at.eq(Some(marked_at)),
    ))
    .execute(conn)
    .await
}

/// ## Summary
/// Writes the recomputed aggregate status, overwriting `missed_at` with
/// the given value (clearing it on a late correction).
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn set_aggregate(
    conn: &mut DbConnection<'_>,
    id: Uuid,
    status: AggregateStatus,
    missed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(reminders::table.find(id))
        .set((
            reminders::status.eq(status),
            reminders::missed_at.eq(missed_at),
            reminders::updated_at.eq(now),
        ))
        .execute(conn)
        .await
}

/// ## Summary
/// Conditionally escalates a still-pending reminder to missed.
/// Returns 0 when the occurrence was already actioned.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn escalate_if_pending(
    conn: &mut DbConnection<'_>,
    id: Uuid,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(
        reminders::table
            .find(id)
            .filter(reminders::status.eq(AggregateStatus::Pending)),
    )
    .set((
        reminders::status.eq(AggregateStatus::Missed),
        reminders::missed_at.eq(Some(now)),
        reminders::updated_at.eq(now),
    ))
    .execute(conn)
    .await
}

/// ## Summary
/// Force-marks every still-pending item of a reminder as missed.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn force_pending_items_missed(
    conn: &mut DbConnection<'_>,
    reminder_id: Uuid,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(
        reminder_medicines::table
            .filter(reminder_medicines::reminder_id.eq(reminder_id))
            .filter(reminder_medicines::status.eq(DoseStatus::Pending)),
    )
    .set((
        reminder_medicines::status.eq(DoseStatus::Missed),
        reminder_medicines::marked_at.eq(Some(now)),
    ))
    .execute(conn)
    .await
}

/// ## Summary
/// Records the snooze: status plus the `snoozed_until` override.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn snooze(
    conn: &mut DbConnection<'_>,
    id: Uuid,
    until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(reminders::table.find(id))
        .set((
            reminders::status.eq(AggregateStatus::Snoozed),
            reminders::snoozed_until.eq(Some(until)),
            reminders::updated_at.eq(now),
        ))
        .execute(conn)
        .await
}

/// ## Summary
/// Conditionally returns a snoozed reminder to pending, clearing the
/// snooze override. Returns 0 when the occurrence was not snoozed.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn resume_snoozed(
    conn: &mut DbConnection<'_>,
    id: Uuid,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(
        reminders::table
            .find(id)
            .filter(reminders::status.eq(AggregateStatus::Snoozed)),
    )
    .set((
        reminders::status.eq(AggregateStatus::Pending),
        reminders::snoozed_until.eq(None::<DateTime<Utc>>),
        reminders::updated_at.eq(now),
    ))
    .execute(conn)
    .await
}

/// ## Summary
/// Bumps the notification counter and marks the occurrence as notified.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn record_notification(
    conn: &mut DbConnection<'_>,
    id: Uuid,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(reminders::table.find(id))
        .set((
            reminders::notification_sent.eq(true),
            reminders::notification_count.eq(reminders::notification_count + 1),
            reminders::updated_at.eq(now),
        ))
        .execute(conn)
        .await
}

/// ## Summary
/// One-shot compare-and-set of `parent_notified`. Returns 0 when the
/// guardian was already notified for this occurrence.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn claim_parent_notification(
    conn: &mut DbConnection<'_>,
    id: Uuid,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(
        reminders::table
            .find(id)
            .filter(reminders::parent_notified.eq(false)),
    )
    .set((
        reminders::parent_notified.eq(true),
        reminders::updated_at.eq(now),
    ))
    .execute(conn)
    .await
}

/// ## Summary
/// Deletes a reminder (items cascade).
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn delete(conn: &mut DbConnection<'_>, id: Uuid) -> QueryResult<usize> {
    diesel::delete(reminders::table.find(id)).execute(conn).await
}
