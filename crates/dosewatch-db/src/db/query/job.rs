//! Query composition for `scheduled_jobs`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::db::connection::DbConnection;
use crate::db::enums::JobState;
use crate::db::schema::scheduled_jobs;
use crate::model::job::{NewScheduledJob, ScheduledJob};

/// ## Summary
/// Re-arms an existing job row with a fresh pending state, unless the job
/// is currently executing. Returns 0 when there was no row to update.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn rearm(
    conn: &mut DbConnection<'_>,
    job: &NewScheduledJob,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(
        scheduled_jobs::table
            .find(&job.id)
            .filter(scheduled_jobs::state.ne(JobState::Running)),
    )
    .set((
        scheduled_jobs::kind.eq(job.kind),
        scheduled_jobs::reminder_id.eq(job.reminder_id),
        scheduled_jobs::fire_at.eq(job.fire_at),
        scheduled_jobs::state.eq(JobState::Pending),
        scheduled_jobs::attempts.eq(0),
        scheduled_jobs::max_attempts.eq(job.max_attempts),
        scheduled_jobs::last_error.eq(None::<String>),
        scheduled_jobs::updated_at.eq(now),
    ))
    .execute(conn)
    .await
}

/// ## Summary
/// Inserts a fresh job row; an id collision is left untouched (the
/// existing row won the race).
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn insert_new(conn: &mut DbConnection<'_>, job: &NewScheduledJob) -> QueryResult<usize> {
    diesel::insert_into(scheduled_jobs::table)
        .values(job)
        .on_conflict(scheduled_jobs::id)
        .do_nothing()
        .execute(conn)
        .await
}

/// ## Summary
/// Cancels a job that has not started executing. Returns 0 when nothing
/// was pending under that id.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn cancel(
    conn: &mut DbConnection<'_>,
    job_id: &str,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(
        scheduled_jobs::table
            .find(job_id)
            .filter(scheduled_jobs::state.eq(JobState::Pending)),
    )
    .set((
        scheduled_jobs::state.eq(JobState::Cancelled),
        scheduled_jobs::updated_at.eq(now),
    ))
    .execute(conn)
    .await
}

/// ## Summary
/// Claims up to `limit` due pending jobs, transitioning them to running.
///
/// The select-then-guarded-update pair means a row is claimed by exactly
/// one caller: the update filters on the pending state again and only
/// rows it actually transitioned are returned.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn claim_due(
    conn: &mut DbConnection<'_>,
    now: DateTime<Utc>,
    limit: i64,
) -> QueryResult<Vec<ScheduledJob>> {
    let due_ids: Vec<String> = scheduled_jobs::table
        .filter(scheduled_jobs::state.eq(JobState::Pending))
        .filter(scheduled_jobs::fire_at.le(now))
        .order(scheduled_jobs::fire_at.asc())
        .limit(limit)
        .select(scheduled_jobs::id)
        .load(conn)
        .await?;

    if due_ids.is_empty() {
        return Ok(Vec::new());
    }

    diesel::update(
        scheduled_jobs::table
            .filter(scheduled_jobs::id.eq_any(&due_ids))
            .filter(scheduled_jobs::state.eq(JobState::Pending)),
    )
    .set((
        scheduled_jobs::state.eq(JobState::Running),
        scheduled_jobs::updated_at.eq(now),
    ))
    .get_results(conn)
    .await
}

/// ## Summary
/// Returns running jobs last touched at or before `cutoff` to pending.
/// A claim is only ever resolved by the process that took it, so rows
/// still running past the cutoff belong to a process that died.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn release_stuck(
    conn: &mut DbConnection<'_>,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(
        scheduled_jobs::table
            .filter(scheduled_jobs::state.eq(JobState::Running))
            .filter(scheduled_jobs::updated_at.le(cutoff)),
    )
    .set((
        scheduled_jobs::state.eq(JobState::Pending),
        scheduled_jobs::updated_at.eq(now),
    ))
    .execute(conn)
    .await
}

/// ## Summary
/// Marks a running job done.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn mark_done(
    conn: &mut DbConnection<'_>,
    job_id: &str,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(scheduled_jobs::table.find(job_id))
        .set((
            scheduled_jobs::state.eq(JobState::Done),
            scheduled_jobs::updated_at.eq(now),
        ))
        .execute(conn)
        .await
}

/// ## Summary
/// Re-queues a running job for a backoff retry, recording the attempt
/// and the handler error.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn retry_later(
    conn: &mut DbConnection<'_>,
    job_id: &str,
    next_fire_at: DateTime<Utc>,
    error: &str,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(scheduled_jobs::table.find(job_id))
        .set((
            scheduled_jobs::state.eq(JobState::Pending),
            scheduled_jobs::fire_at.eq(next_fire_at),
            scheduled_jobs::attempts.eq(scheduled_jobs::attempts + 1),
            scheduled_jobs::last_error.eq(Some(error)),
            scheduled_jobs::updated_at.eq(now),
        ))
        .execute(conn)
        .await
}

/// ## Summary
/// Terminal failure after exhausted retries; the job is dropped.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn mark_failed(
    conn: &mut DbConnection<'_>,
    job_id: &str,
    error: &str,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::update(scheduled_jobs::table.find(job_id))
        .set((
            scheduled_jobs::state.eq(JobState::Failed),
            scheduled_jobs::attempts.eq(scheduled_jobs::attempts + 1),
            scheduled_jobs::last_error.eq(Some(error)),
            scheduled_jobs::updated_at.eq(now),
        ))
        .execute(conn)
        .await
}
