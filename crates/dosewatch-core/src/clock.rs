//! Time source abstraction.
//!
//! All persisted instants are UTC; conversion to a wall-clock timezone
//! happens only at presentation boundaries (see the notification renderer).

use chrono::{DateTime, Utc};

/// Supplies "now" to the scheduling engine.
///
/// The engine takes this as a trait object so tests can drive time
/// explicitly instead of sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
