//! Integration test support for the dosewatch workspace.
//!
//! Provides in-memory implementations of every collaborator contract
//! plus a manual clock, so the full scheduling engine can be exercised
//! deterministically without a database or real transports.
#![allow(
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

pub mod clock;
pub mod engine;
pub mod memory;

pub use clock::ManualClock;
pub use engine::{TestEngine, test_scheduler_config};
pub use memory::{
    Channel, Delivery, MemoryJobStore, MemoryReminderStore, MemoryUserDirectory,
    RecordingDispatcher,
};
