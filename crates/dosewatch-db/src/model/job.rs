//! Models for the scheduled_jobs table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use dosewatch_core::store::JobRecord;

use crate::db::enums::{JobKind, JobState};
use crate::db::schema::scheduled_jobs;

/// One durable delayed job row.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = scheduled_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ScheduledJob {
    /// Deterministic id derived from the reminder id.
    pub id: String,
    pub kind: JobKind,
    pub reminder_id: Uuid,
    pub fire_at: DateTime<Utc>,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New job row for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scheduled_jobs)]
pub struct NewScheduledJob {
    pub id: String,
    pub kind: JobKind,
    pub reminder_id: Uuid,
    pub fire_at: DateTime<Utc>,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
}

impl ScheduledJob {
    /// Converts the row into the queue's job record.
    #[must_use]
    pub fn into_record(self) -> JobRecord {
        JobRecord {
            id: self.id,
            kind: self.kind.into(),
            reminder_id: self.reminder_id,
            fire_at: self.fire_at,
            state: self.state.into(),
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            last_error: self.last_error,
        }
    }
}
