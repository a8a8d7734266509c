//! Shared types and contracts for the dosewatch reminder backend.
//!
//! This crate holds everything the other crates agree on without pulling in
//! a database or runtime dependency: the domain model for a reminder
//! occurrence, the pure status state machine, the recurrence rule
//! representation, configuration, and the collaborator contracts (store,
//! notification dispatcher, user directory, clock).

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod store;
pub mod types;
