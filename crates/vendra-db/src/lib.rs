//! # vendra-db
//!
//! Storage layer for the vendra CRM core: client records, SIM card
//! inventory, and workflow tasks, backed by Postgres via `sqlx`.
//!
//! The client/SIM relationship is denormalized on both sides with no
//! foreign key between the tables (soft-deleted rows must outlive the
//! relationship, which rules out a hard cascade). Models expose static
//! async query methods plus `_in_tx` variants for the call sites that need
//! both sides of the pair to commit atomically.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::connect;
