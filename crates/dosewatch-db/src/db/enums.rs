//! Database enum types with Diesel serialization.
//!
//! This module provides type-safe enum wrappers for database CHECK constraints.
//! Each enum implements `ToSql` and `FromSql` for automatic conversion between Rust and `PostgreSQL`.

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use std::fmt;
use std::io::Write;

/// Per-medicine dose status.
///
/// Maps to `reminder_medicines.status` CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum DoseStatus {
    Pending,
    Taken,
    Missed,
}

impl ToSql<Text, Pg> for DoseStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for DoseStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(Self::Pending),
            b"taken" => Ok(Self::Taken),
            b"missed" => Ok(Self::Missed),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl DoseStatus {
    /// Returns the database string representation of this dose status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Taken => "taken",
            Self::Missed => "missed",
        }
    }
}

impl fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DoseStatus> for dosewatch_core::types::DoseStatus {
    fn from(db_status: DoseStatus) -> Self {
        match db_status {
            DoseStatus::Pending => Self::Pending,
            DoseStatus::Taken => Self::Taken,
            DoseStatus::Missed => Self::Missed,
        }
    }
}

impl From<dosewatch_core::types::DoseStatus> for DoseStatus {
    fn from(core_status: dosewatch_core::types::DoseStatus) -> Self {
        match core_status {
            dosewatch_core::types::DoseStatus::Pending => Self::Pending,
            dosewatch_core::types::DoseStatus::Taken => Self::Taken,
            dosewatch_core::types::DoseStatus::Missed => Self::Missed,
        }
    }
}

/// Aggregate occurrence status.
///
/// Maps to `reminders.status` CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum AggregateStatus {
    Pending,
    Completed,
    PartiallyCompleted,
    Missed,
    Snoozed,
}

impl ToSql<Text, Pg> for AggregateStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for AggregateStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(Self::Pending),
            b"completed" => Ok(Self::Completed),
            b"partially_completed" => Ok(Self::PartiallyCompleted),
            b"missed" => Ok(Self::Missed),
            b"snoozed" => Ok(Self::Snoozed),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl AggregateStatus {
    /// Returns the database string representation of this aggregate status.
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
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AggregateStatus> for dosewatch_core::types::AggregateStatus {
    fn from(db_status: AggregateStatus) -> Self {
        match db_status {
            AggregateStatus::Pending => Self::Pending,
            AggregateStatus::Completed => Self::Completed,
            AggregateStatus::PartiallyCompleted => Self::PartiallyCompleted,
            AggregateStatus::Missed => Self::Missed,
            AggregateStatus::Snoozed => Self::Snoozed,
        }
    }
}

impl From<dosewatch_core::types::AggregateStatus> for AggregateStatus {
    fn from(core_status: dosewatch_core::types::AggregateStatus) -> Self {
        match core_status {
            dosewatch_core::types::AggregateStatus::Pending => Self::Pending,
            dosewatch_core::types::AggregateStatus::Completed => Self::Completed,
            dosewatch_core::types::AggregateStatus::PartiallyCompleted => Self::PartiallyCompleted,
            dosewatch_core::types::AggregateStatus::Missed => Self::Missed,
            dosewatch_core::types::AggregateStatus::Snoozed => Self::Snoozed,
        }
    }
}

/// Recurrence rule tag; the rule payload lives in sibling columns.
///
/// Maps to `reminders.repeat_kind` CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum RepeatKind {
    None,
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl ToSql<Text, Pg> for RepeatKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for RepeatKind {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"none" => Ok(Self::None),
            b"daily" => Ok(Self::Daily),
            b"weekly" => Ok(Self::Weekly),
            b"monthly" => Ok(Self::Monthly),
            b"custom" => Ok(Self::Custom),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl RepeatKind {
    /// Returns the database string representation of this repeat kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&dosewatch_core::types::RepeatRule> for RepeatKind {
    fn from(rule: &dosewatch_core::types::RepeatRule) -> Self {
        use dosewatch_core::types::RepeatRule;
        match rule {
            RepeatRule::None => Self::None,
            RepeatRule::Daily => Self::Daily,
            RepeatRule::Weekly { .. } => Self::Weekly,
            RepeatRule::Monthly { .. } => Self::Monthly,
            RepeatRule::Custom { .. } => Self::Custom,
        }
    }
}

/// Custom repeat interval unit.
///
/// Maps to `reminders.custom_unit` CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum CustomUnit {
    Hours,
    Days,
    Weeks,
    Months,
}

impl ToSql<Text, Pg> for CustomUnit {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for CustomUnit {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"hours" => Ok(Self::Hours),
            b"days" => Ok(Self::Days),
            b"weeks" => Ok(Self::Weeks),
            b"months" => Ok(Self::Months),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl CustomUnit {
    /// Returns the database string representation of this custom unit.
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

impl fmt::Display for CustomUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CustomUnit> for dosewatch_core::types::CustomUnit {
    fn from(db_unit: CustomUnit) -> Self {
        match db_unit {
            CustomUnit::Hours => Self::Hours,
            CustomUnit::Days => Self::Days,
            CustomUnit::Weeks => Self::Weeks,
            CustomUnit::Months => Self::Months,
        }
    }
}

impl From<dosewatch_core::types::CustomUnit> for CustomUnit {
    fn from(core_unit: dosewatch_core::types::CustomUnit) -> Self {
        match core_unit {
            dosewatch_core::types::CustomUnit::Hours => Self::Hours,
            dosewatch_core::types::CustomUnit::Days => Self::Days,
            dosewatch_core::types::CustomUnit::Weeks => Self::Weeks,
            dosewatch_core::types::CustomUnit::Months => Self::Months,
        }
    }
}

/// Delayed job kind.
///
/// Maps to `scheduled_jobs.kind` CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum JobKind {
    Fire,
    MissedCheck,
}

impl ToSql<Text, Pg> for JobKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for JobKind {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"fire" => Ok(Self::Fire),
            b"missed_check" => Ok(Self::MissedCheck),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl JobKind {
    /// Returns the database string representation of this job kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fire => "fire",
            Self::MissedCheck => "missed_check",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobKind> for dosewatch_core::store::JobKind {
    fn from(db_kind: JobKind) -> Self {
        match db_kind {
            JobKind::Fire => Self::Fire,
            JobKind::MissedCheck => Self::MissedCheck,
        }
    }
}

impl From<dosewatch_core::store::JobKind> for JobKind {
    fn from(core_kind: dosewatch_core::store::JobKind) -> Self {
        match core_kind {
            dosewatch_core::store::JobKind::Fire => Self::Fire,
            dosewatch_core::store::JobKind::MissedCheck => Self::MissedCheck,
        }
    }
}

/// Delayed job lifecycle state.
///
/// Maps to `scheduled_jobs.state` CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl ToSql<Text, Pg> for JobState {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for JobState {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(Self::Pending),
            b"running" => Ok(Self::Running),
            b"done" => Ok(Self::Done),
            b"failed" => Ok(Self::Failed),
            b"cancelled" => Ok(Self::Cancelled),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl JobState {
    /// Returns the database string representation of this job state.
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

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobState> for dosewatch_core::store::JobState {
    fn from(db_state: JobState) -> Self {
        match db_state {
            JobState::Pending => Self::Pending,
            JobState::Running => Self::Running,
            JobState::Done => Self::Done,
            JobState::Failed => Self::Failed,
            JobState::Cancelled => Self::Cancelled,
        }
    }
}
