pub mod job;
pub mod reminder;
pub mod user;
