//! Scheduling engine for medicine reminders.
//!
//! Everything here runs against the collaborator contracts defined in
//! `dosewatch-core`; nothing in this crate touches a database or a
//! delivery transport directly, which is what lets the integration
//! suites exercise the full engine in memory.

pub mod error;
pub mod notify;
pub mod queue;
pub mod scheduler;
