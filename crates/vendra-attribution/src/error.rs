//! Error types for the attribution engine.

use thiserror::Error;
use vendra_db::DbError;

/// Why an attribution request was rejected.
///
/// Rejections are business errors: they are surfaced verbatim to the caller
/// and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The requesting client does not exist or is soft deleted.
    ClientNotFound {
        /// Requested client ID.
        client_id: i64,
    },

    /// No SIM card with the requested number exists in inventory.
    SimNotFound {
        /// Requested card number.
        number: String,
    },

    /// The card is already held by another active client.
    SimAlreadyAssigned {
        /// Requested card number.
        number: String,
        /// Name of the client currently holding the card.
        holder: String,
    },

    /// The requesting client already holds a different card.
    ClientAlreadyHasSim {
        /// Number of the card the client currently holds.
        current: String,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ClientNotFound { client_id } => {
                write!(f, "client {client_id} not found or inactive")
            }
            RejectReason::SimNotFound { number } => {
                write!(f, "SIM card {number} not found")
            }
            RejectReason::SimAlreadyAssigned { number, holder } => {
                write!(f, "SIM card {number} is already assigned to {holder}")
            }
            RejectReason::ClientAlreadyHasSim { current } => {
                write!(f, "client already holds SIM card {current}")
            }
        }
    }
}

/// Result type for attribution operations.
pub type AttributionResult<T> = Result<T, AttributionError>;

/// Errors that can occur in the attribution engine.
#[derive(Debug, Error)]
pub enum AttributionError {
    /// Business-rule rejection. Surfaced to the caller, never retried.
    #[error("Attribution rejected: {0}")]
    Rejected(RejectReason),

    /// Storage-level failure. Transient; the caller may retry the whole
    /// operation, which is idempotent with respect to final state.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl AttributionError {
    /// Check if this error is a business-rule rejection.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, AttributionError::Rejected(_))
    }

    /// Check if this error is transient and the operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, AttributionError::Database(_))
    }
}
