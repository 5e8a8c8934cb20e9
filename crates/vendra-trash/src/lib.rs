//! # vendra-trash
//!
//! Recoverable trash for the vendra CRM: a unified, time-bounded "undo"
//! view across clients, tasks and SIM cards.
//!
//! Soft-deleted rows stay in their home tables with `deleted_at` set and
//! remain restorable for a fixed window. The service computes the unified
//! view on demand (joining related rows for display names), caches it
//! briefly per requesting identity, and hard-deletes expired rows from a
//! purge timer that runs independently of the reconciliation schedule.

pub mod cache;
pub mod error;
pub mod service;
pub mod worker;

pub use cache::{TrashCache, DEFAULT_TTL};
pub use error::{TrashError, TrashResult};
pub use service::{DeletedItem, TrashKind, TrashService, RECOVERY_WINDOW_HOURS};
pub use worker::{PurgeWorker, PurgeWorkerConfig};
