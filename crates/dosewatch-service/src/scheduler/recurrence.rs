//! Recurrence generation: pure date math over a fire time and a rule.
//!
//! The generator never mutates a fired occurrence; it computes the next
//! fire instant and, when the series has not ended, materializes a fresh
//! pending occurrence carrying the same medicines and rule.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use dosewatch_core::types::{
    CustomUnit, NewMedicineDose, NewReminderOccurrence, ReminderOccurrence, RepeatRule,
};

/// ## Summary
/// Computes the fire instant following `current` under `rule`.
///
/// Returns `None` for a non-recurring rule. Time of day is preserved for
/// the calendar-based rules; weekly day sets are 0 = Sunday .. 6 =
/// Saturday, monthly day sets 1..=31 with days a month does not contain
/// skipped.
#[must_use]
pub fn next_fire_time(rule: &RepeatRule, current: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match rule {
        RepeatRule::None => None,
        RepeatRule::Daily => Some(current + Duration::days(1)),
        RepeatRule::Weekly { days_of_week } => Some(next_weekly(current, days_of_week)),
        RepeatRule::Monthly { days_of_month } => Some(next_monthly(current, days_of_month)),
        RepeatRule::Custom { interval, unit } => Some(next_custom(current, *interval, *unit)),
    }
}

/// ## Summary
/// Materializes the next occurrence of a recurring series, or `None`
/// when the rule is one-shot or the next instant falls past
/// `scheduled_end`.
///
/// The new occurrence starts fresh: all items pending, no snooze, no
/// missed or delivery bookkeeping carried over. Its id is derived from
/// the parent, so a redelivered fire handler materializes the same
/// record instead of forking the series.
#[must_use]
pub fn next_occurrence(occurrence: &ReminderOccurrence) -> Option<NewReminderOccurrence> {
    let next = next_fire_time(&occurrence.repeat, occurrence.fire_time)?;
    if let Some(end) = occurrence.scheduled_end {
        if next > end {
            return None;
        }
    }
    Some(NewReminderOccurrence {
        id: Uuid::new_v5(&occurrence.id, b"next-occurrence"),
        user_id: occurrence.user_id,
        medicines: occurrence
            .medicines
            .iter()
            .map(|m| NewMedicineDose {
                medicine_id: m.medicine_id,
                name: m.name.clone(),
            })
            .collect(),
        scheduled_start: occurrence.scheduled_start,
        scheduled_end: occurrence.scheduled_end,
        fire_time: next,
        repeat: occurrence.repeat.clone(),
    })
}

fn next_weekly(current: DateTime<Utc>, days: &[u8]) -> DateTime<Utc> {
    let mut days: Vec<u8> = days.iter().copied().filter(|d| *d <= 6).collect();
    days.sort_unstable();
    days.dedup();
    if days.is_empty() {
        return current + Duration::days(7);
    }

    let today = u8::try_from(current.weekday().num_days_from_sunday()).unwrap_or(0);
    // Smallest listed day strictly after today's weekday this week, else
    // wrap to the smallest listed day next week.
    let delta = days.iter().copied().find(|d| *d > today).map_or_else(
        || i64::from(7 - today + days[0]),
        |d| i64::from(d - today),
    );
    current + Duration::days(delta)
}

fn next_monthly(current: DateTime<Utc>, days: &[u8]) -> DateTime<Utc> {
    let time = current.time();
    let current_date = current.date_naive();

    let mut days: Vec<u32> = days
        .iter()
        .copied()
        .filter(|d| (1..=31).contains(d))
        .map(u32::from)
        .collect();
    days.sort_unstable();
    days.dedup();

    if days.is_empty() {
        // Same day next month, clamped to the month's length.
        let date = add_months_clamped(current_date, 1);
        return Utc.from_utc_datetime(&date.and_time(time));
    }

    // Later listed day within the current month first.
    if let Some(date) = days
        .iter()
        .copied()
        .filter(|d| *d > current_date.day())
        .find_map(|d| NaiveDate::from_ymd_opt(current_date.year(), current_date.month(), d))
    {
        return Utc.from_utc_datetime(&date.and_time(time));
    }

    // Walk forward month by month, skipping months that contain none of
    // the listed days (a {31} rule skips February entirely).
    for offset in 1..=48 {
        let (year, month) = month_offset(current_date.year(), current_date.month(), offset);
        if let Some(date) = days
            .iter()
            .copied()
            .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
        {
            return Utc.from_utc_datetime(&date.and_time(time));
        }
    }

    // Unreachable with a non-empty validated day set.
    current + Duration::days(31)
}

fn next_custom(current: DateTime<Utc>, interval: u32, unit: CustomUnit) -> DateTime<Utc> {
    let n = i64::from(interval.max(1));
    match unit {
        CustomUnit::Hours => current + Duration::hours(n),
        CustomUnit::Days => current + Duration::days(n),
        CustomUnit::Weeks => current + Duration::weeks(n),
        CustomUnit::Months => {
            let months = i32::try_from(interval.max(1)).unwrap_or(i32::MAX);
            let date = add_months_clamped(current.date_naive(), months);
            Utc.from_utc_datetime(&date.and_time(current.time()))
        }
    }
}

/// Advances a date by whole months, clamping the day to the target
/// month's length (Jan 31 + 1 month = Feb 28/29).
fn add_months_clamped(date: NaiveDate, months: i32) -> NaiveDate {
    let (year, month) = month_offset(date.year(), date.month(), months);
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

fn month_offset(year: i32, month: u32, offset: i32) -> (i32, u32) {
    let index = year * 12 + i32::try_from(month).unwrap_or(1) - 1 + offset;
    let new_month = u32::try_from(index.rem_euclid(12)).unwrap_or(0) + 1;
    (index.div_euclid(12), new_month)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = month_offset(year, month, 1);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}
