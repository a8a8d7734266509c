//! Models for the reminders and reminder_medicines tables.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use dosewatch_core::types::{
    MedicineDose, RepeatRule, ReminderOccurrence,
};

use crate::db::enums::{AggregateStatus, CustomUnit, DoseStatus, RepeatKind};
use crate::db::schema::{reminder_medicines, reminders};

/// One reminder occurrence row.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = reminders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Reminder {
    pub id: Uuid,
    /// Owning user (referenced, not owned).
    pub user_id: Uuid,
    /// Lower bound of the recurring series.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Upper bound of the recurring series.
    pub scheduled_end: Option<DateTime<Utc>>,
    /// The instant this occurrence should notify.
    pub fire_time: DateTime<Utc>,
    /// Snooze override of `fire_time`.
    pub snoozed_until: Option<DateTime<Utc>>,
    /// Set when escalation marked the occurrence missed.
    pub missed_at: Option<DateTime<Utc>>,
    /// Recurrence rule tag; payload in the sibling columns.
    pub repeat_kind: RepeatKind,
    /// Day-of-week set (0-6), weekly rules only.
    pub days_of_week: Option<Vec<i16>>,
    /// Day-of-month set (1-31), monthly rules only.
    pub days_of_month: Option<Vec<i16>>,
    /// Interval count, custom rules only.
    pub custom_interval: Option<i32>,
    /// Interval unit, custom rules only.
    pub custom_unit: Option<CustomUnit>,
    /// Aggregate status derived from the item statuses.
    pub status: AggregateStatus,
    pub notification_sent: bool,
    pub notification_count: i32,
    /// One-shot guard against duplicate guardian escalation.
    pub parent_notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New reminder occurrence row for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reminders)]
pub struct NewReminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub fire_time: DateTime<Utc>,
    pub repeat_kind: RepeatKind,
    pub days_of_week: Option<Vec<i16>>,
    pub days_of_month: Option<Vec<i16>>,
    pub custom_interval: Option<i32>,
    pub custom_unit: Option<CustomUnit>,
    pub status: AggregateStatus,
}

/// One medicine item row within a reminder occurrence.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = reminder_medicines)]
#[diesel(primary_key(reminder_id, position))]
#[diesel(belongs_to(Reminder))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReminderMedicine {
    pub reminder_id: Uuid,
    /// Zero-based creation order; the API addresses items by this index.
    pub position: i32,
    pub medicine_id: Uuid,
    /// Display name, denormalized for message rendering.
    pub name: String,
    pub status: DoseStatus,
    pub marked_by: Option<Uuid>,
    pub marked_at: Option<DateTime<Utc>>,
}

/// New medicine item row for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reminder_medicines)]
pub struct NewReminderMedicine {
    pub reminder_id: Uuid,
    pub position: i32,
    pub medicine_id: Uuid,
    pub name: String,
    pub status: DoseStatus,
}

impl Reminder {
    /// ## Summary
    /// Reassembles the tagged recurrence rule from the flattened columns.
    ///
    /// Unknown or inconsistent payloads degrade to the bare tag defaults
    /// (empty day sets, `None` for a custom rule missing its payload).
    #[must_use]
    pub fn repeat_rule(&self) -> RepeatRule {
        match self.repeat_kind {
            RepeatKind::None => RepeatRule::None,
            RepeatKind::Daily => RepeatRule::Daily,
            RepeatKind::Weekly => RepeatRule::Weekly {
                days_of_week: day_set(self.days_of_week.as_deref()),
            },
            RepeatKind::Monthly => RepeatRule::Monthly {
                days_of_month: day_set(self.days_of_month.as_deref()),
            },
            RepeatKind::Custom => match (self.custom_interval, self.custom_unit) {
                (Some(interval), Some(unit)) if interval > 0 => RepeatRule::Custom {
                    interval: interval.unsigned_abs(),
                    unit: unit.into(),
                },
                _ => RepeatRule::None,
            },
        }
    }

    /// ## Summary
    /// Combines the row with its medicine items into the domain model.
    ///
    /// `items` must already be ordered by position.
    #[must_use]
    pub fn into_occurrence(self, items: Vec<ReminderMedicine>) -> ReminderOccurrence {
        let repeat = self.repeat_rule();
        ReminderOccurrence {
            id: self.id,
            user_id: self.user_id,
            medicines: items.into_iter().map(ReminderMedicine::into_dose).collect(),
            scheduled_start: self.scheduled_start,
            scheduled_end: self.scheduled_end,
            fire_time: self.fire_time,
            snoozed_until: self.snoozed_until,
            missed_at: self.missed_at,
            repeat,
            status: self.status.into(),
            notification_sent: self.notification_sent,
            notification_count: self.notification_count,
            parent_notified: self.parent_notified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl ReminderMedicine {
    /// Converts the row into the domain dose item.
    #[must_use]
    pub fn into_dose(self) -> MedicineDose {
        MedicineDose {
            medicine_id: self.medicine_id,
            name: self.name,
            status: self.status.into(),
            marked_by: self.marked_by,
            marked_at: self.marked_at,
        }
    }
}

/// Flattens a recurrence rule into the column representation.
#[must_use]
pub fn rule_columns(
    rule: &RepeatRule,
) -> (
    RepeatKind,
    Option<Vec<i16>>,
    Option<Vec<i16>>,
    Option<i32>,
    Option<CustomUnit>,
) {
    match rule {
        RepeatRule::None => (RepeatKind::None, None, None, None, None),
        RepeatRule::Daily => (RepeatKind::Daily, None, None, None, None),
        RepeatRule::Weekly { days_of_week } => (
            RepeatKind::Weekly,
            Some(days_of_week.iter().map(|d| i16::from(*d)).collect()),
            None,
            None,
            None,
        ),
        RepeatRule::Monthly { days_of_month } => (
            RepeatKind::Monthly,
            None,
            Some(days_of_month.iter().map(|d| i16::from(*d)).collect()),
            None,
            None,
        ),
        RepeatRule::Custom { interval, unit } => (
            RepeatKind::Custom,
            None,
            None,
            Some(i32::try_from(*interval).unwrap_or(i32::MAX)),
            Some((*unit).into()),
        ),
    }
}

fn day_set(days: Option<&[i16]>) -> Vec<u8> {
    days.unwrap_or_default()
        .iter()
        .filter_map(|d| u8::try_from(*d).ok())
        .collect()
}
