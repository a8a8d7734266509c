//! PostgreSQL persistence for dosewatch.
//!
//! Schema, text-backed enum wrappers, row models, query modules, and the
//! concrete implementations of the store contracts from
//! `dosewatch-core`.

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod db;
pub mod error;
pub mod model;
pub mod store;

/// Embedded schema migrations, run once at process start.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
