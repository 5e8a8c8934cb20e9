//! Error types for the trash subsystem.

use thiserror::Error;
use vendra_db::DbError;

/// Result type for trash operations.
pub type TrashResult<T> = Result<T, TrashError>;

/// Errors that can occur in the trash subsystem.
///
/// Per-row purge failures are deliberately absent: the sweep logs and
/// skips them rather than aborting, so they never surface as errors.
#[derive(Debug, Error)]
pub enum TrashError {
    /// Storage-level failure. Transient; the call may be retried.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The entity kind string did not name a trashable kind.
    #[error("Unknown trash kind: {0}")]
    UnknownKind(String),
}

impl TrashError {
    /// Check if this error is transient and the operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, TrashError::Database(_))
    }
}
