//! Domain model for reminder occurrences.
//!
//! An *occurrence* is one concrete, schedulable dose event: a specific
//! instant at which one or more medicines are due. Recurring series are
//! represented by each occurrence carrying an immutable copy of its
//! recurrence rule; the recurrence generator materializes a fresh record
//! for the next instant instead of mutating a fired one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a single medicine within an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Pending,
    Taken,
    Missed,
}

impl DoseStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Taken => "taken",
            Self::Missed => "missed",
        }
    }
}

impl std::fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of an occurrence.
///
/// Derived from the per-item [`DoseStatus`] multiset by
/// [`aggregate_status`], with two exceptions written directly: `Snoozed`
/// (set by the snooze operation together with `snoozed_until`) and the
/// `Missed` transition written by escalation while it force-marks items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Pending,
    Completed,
    PartiallyCompleted,
    Missed,
    Snoozed,
}

impl AggregateStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Missed => "missed",
            Self::Snoozed => "snoozed",
        }
    }

    /// True for the statuses the scheduling engine still acts on.
    #[must_use]
    pub const fn is_schedulable(self) -> bool {
        matches!(self, Self::Pending | Self::Snoozed)
    }
}

impl std::fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit for custom repeat intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomUnit {
    Hours,
    Days,
    Weeks,
    Months,
}

impl CustomUnit {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
        }
    }
}

impl std::fmt::Display for CustomUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurrence rule, tagged by kind.
///
/// Weekly carries its day-of-week set (0 = Sunday .. 6 = Saturday),
/// monthly its day-of-month set (1..=31), custom its interval and unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepeatRule {
    None,
    Daily,
    Weekly { days_of_week: Vec<u8> },
    Monthly { days_of_month: Vec<u8> },
    Custom { interval: u32, unit: CustomUnit },
}

impl RepeatRule {
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly { .. } => "weekly",
            Self::Monthly { .. } => "monthly",
            Self::Custom { .. } => "custom",
        }
    }

    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for RepeatRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_str())
    }
}

/// One medicine within an occurrence, with its independent status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineDose {
    pub medicine_id: Uuid,
    /// Display name, denormalized for message rendering.
    pub name: String,
    pub status: DoseStatus,
    /// Who marked the item; absent when escalation wrote the status.
    pub marked_by: Option<Uuid>,
    pub marked_at: Option<DateTime<Utc>>,
}

impl MedicineDose {
    /// A fresh, unmarked dose for the given medicine.
    #[must_use]
    pub const fn pending(medicine_id: Uuid, name: String) -> Self {
        Self {
            medicine_id,
            name,
            status: DoseStatus::Pending,
            marked_by: None,
            marked_at: None,
        }
    }
}

/// One concrete, schedulable dose event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderOccurrence {
    pub id: Uuid,
    /// Owning user. Referenced only; user lifecycle is external.
    pub user_id: Uuid,
    /// Medicines due at this occurrence, in creation order. Never empty.
    pub medicines: Vec<MedicineDose>,
    /// Lower bound of the recurring series, if bounded.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Upper bound of the recurring series; recurrence stops past it.
    pub scheduled_end: Option<DateTime<Utc>>,
    /// The instant this occurrence should notify.
    pub fire_time: DateTime<Utc>,
    /// Optional override of `fire_time` set by snoozing.
    pub snoozed_until: Option<DateTime<Utc>>,
    /// Set when escalation marked the occurrence missed.
    pub missed_at: Option<DateTime<Utc>>,
    /// Immutable copy of the series recurrence rule.
    pub repeat: RepeatRule,
    pub status: AggregateStatus,
    pub notification_sent: bool,
    pub notification_count: i32,
    /// One-shot guard against duplicate guardian escalation.
    pub parent_notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReminderOccurrence {
    /// ## Summary
    /// Returns the instant scheduling must use: `snoozed_until` when set
    /// and still in the future, otherwise `fire_time`.
    #[must_use]
    pub fn effective_fire_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.snoozed_until {
            Some(snoozed) if snoozed > now => snoozed,
            _ => self.fire_time,
        }
    }

    /// Iterator over the per-item statuses.
    pub fn item_statuses(&self) -> impl Iterator<Item = DoseStatus> + '_ {
        self.medicines.iter().map(|m| m.status)
    }
}

/// Input for creating an occurrence (API layer or recurrence generator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReminderOccurrence {
    /// Caller-chosen id. The recurrence generator derives it from the
    /// parent occurrence, so a redelivered fire collapses onto the same
    /// record instead of forking the series.
    pub id: Uuid,
    pub user_id: Uuid,
    pub medicines: Vec<NewMedicineDose>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub fire_time: DateTime<Utc>,
    pub repeat: RepeatRule,
}

/// Medicine reference for a new occurrence; status starts pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMedicineDose {
    pub medicine_id: Uuid,
    pub name: String,
}

/// Result of marking one item taken or missed.
#[derive(Debug, Clone)]
pub struct MarkOutcome {
    pub occurrence: ReminderOccurrence,
    /// True when the mark corrected an occurrence escalation had already
    /// auto-missed. Informational, not an error.
    pub late_correction: bool,
}

/// A user's notification channels and addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContact {
    pub user_id: Uuid,
    pub name: String,
    pub push_token: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub prefers_push: bool,
    pub prefers_sms: bool,
    pub prefers_email: bool,
}

/// ## Summary
/// Computes the aggregate status from the per-item status multiset.
///
/// Missed dominates: a single missed item marks the whole occurrence
/// missed, unless a later taken-mark upgrades it through a recompute.
/// All taken is completed; some-but-not-all taken with none missed is
/// partially completed; anything else is pending. `Snoozed` is never
/// produced here; the snooze operation sets it directly.
#[must_use]
pub fn aggregate_status(items: &[DoseStatus]) -> AggregateStatus {
    let any_missed = items.iter().any(|s| *s == DoseStatus::Missed);
    if any_missed {
        return AggregateStatus::Missed;
    }
    let taken = items.iter().filter(|s| **s == DoseStatus::Taken).count();
    if taken == items.len() && !items.is_empty() {
        AggregateStatus::Completed
    } else if taken > 0 {
        AggregateStatus::PartiallyCompleted
    } else {
        AggregateStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use DoseStatus::{Missed, Pending, Taken};

    #[test]
    fn aggregate_all_taken_is_completed() {
        assert_eq!(aggregate_status(&[Taken]), AggregateStatus::Completed);
        assert_eq!(
            aggregate_status(&[Taken, Taken, Taken]),
            AggregateStatus::Completed
        );
    }

    #[test]
    fn aggregate_some_taken_is_partially_completed() {
        assert_eq!(
            aggregate_status(&[Taken, Pending]),
            AggregateStatus::PartiallyCompleted
        );
        assert_eq!(
            aggregate_status(&[Pending, Taken, Pending]),
            AggregateStatus::PartiallyCompleted
        );
    }

    #[test]
    fn aggregate_missed_dominates() {
        assert_eq!(aggregate_status(&[Missed]), AggregateStatus::Missed);
        assert_eq!(aggregate_status(&[Taken, Missed]), AggregateStatus::Missed);
        assert_eq!(
            aggregate_status(&[Taken, Taken, Missed]),
            AggregateStatus::Missed
        );
        assert_eq!(
            aggregate_status(&[Pending, Missed]),
            AggregateStatus::Missed
        );
    }

    #[test]
    fn aggregate_none_marked_is_pending() {
        assert_eq!(aggregate_status(&[Pending]), AggregateStatus::Pending);
        assert_eq!(
            aggregate_status(&[Pending, Pending]),
            AggregateStatus::Pending
        );
        // Degenerate empty set stays pending rather than completed.
        assert_eq!(aggregate_status(&[]), AggregateStatus::Pending);
    }

    #[test]
    fn aggregate_is_order_independent() {
        let a = aggregate_status(&[Taken, Pending, Missed]);
        let b = aggregate_status(&[Missed, Taken, Pending]);
        let c = aggregate_status(&[Pending, Missed, Taken]);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn effective_fire_time_prefers_future_snooze() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let fire = now + chrono::Duration::minutes(5);
        let mut occ = occurrence_at(fire);

        assert_eq!(occ.effective_fire_time(now), fire);

        let snoozed = now + chrono::Duration::minutes(20);
        occ.snoozed_until = Some(snoozed);
        assert_eq!(occ.effective_fire_time(now), snoozed);

        // A snooze already in the past is ignored.
        occ.snoozed_until = Some(now - chrono::Duration::minutes(1));
        assert_eq!(occ.effective_fire_time(now), fire);
    }

    fn occurrence_at(fire_time: DateTime<Utc>) -> ReminderOccurrence {
        ReminderOccurrence {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            medicines: vec![MedicineDose::pending(Uuid::new_v4(), "aspirin".into())],
            scheduled_start: None,
            scheduled_end: None,
            fire_time,
            snoozed_until: None,
            missed_at: None,
            repeat: RepeatRule::None,
            status: AggregateStatus::Pending,
            notification_sent: false,
            notification_count: 0,
            parent_notified: false,
            created_at: fire_time,
            updated_at: fire_time,
        }
    }
}
