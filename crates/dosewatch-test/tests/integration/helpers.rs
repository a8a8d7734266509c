#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]
//! Shared fixtures for the scheduling suites.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use dosewatch_core::store::ReminderStore;
use dosewatch_core::types::{
    NewMedicineDose, NewReminderOccurrence, ReminderOccurrence, RepeatRule,
};
use dosewatch_test::TestEngine;

/// Suite epoch: a Monday morning.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
}

pub async fn create_reminder(
    engine: &TestEngine,
    user_id: Uuid,
    fire_time: DateTime<Utc>,
    repeat: RepeatRule,
    medicine_names: &[&str],
) -> ReminderOccurrence {
    create_bounded_reminder(engine, user_id, fire_time, None, repeat, medicine_names).await
}

pub async fn create_bounded_reminder(
    engine: &TestEngine,
    user_id: Uuid,
    fire_time: DateTime<Utc>,
    scheduled_end: Option<DateTime<Utc>>,
    repeat: RepeatRule,
    medicine_names: &[&str],
) -> ReminderOccurrence {
    engine
        .reminders
        .create(NewReminderOccurrence {
            id: Uuid::new_v4(),
            user_id,
            medicines: medicine_names
                .iter()
                .map(|name| NewMedicineDose {
                    medicine_id: Uuid::new_v4(),
                    name: (*name).to_owned(),
                })
                .collect(),
            scheduled_start: None,
            scheduled_end,
            fire_time,
            repeat,
        })
        .await
        .expect("create reminder")
}
