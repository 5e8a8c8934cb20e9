//! Attribution validation.
//!
//! Pure decision logic: given a (client, SIM) pair and the currently stored
//! state, decide whether the attribution is legal. Checks short-circuit on
//! the first failure and never mutate anything.

use sqlx::PgPool;

use vendra_db::models::{Client, SimCard, SimStatus};

use crate::error::{AttributionResult, RejectReason};

/// Outcome of validating an attribution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The attribution may proceed.
    Valid {
        /// The card's back-reference names a client that no longer exists
        /// or is inactive. The executor clears the orphan in place and
        /// re-validates before committing.
        orphaned_owner: bool,
    },
    /// The attribution violates a business rule.
    Rejected(RejectReason),
}

impl Validation {
    /// Check if the request passed validation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid { .. })
    }
}

/// Validates attribution requests against stored state.
#[derive(Clone)]
pub struct AttributionValidator {
    pool: PgPool,
}

impl AttributionValidator {
    /// Create a new validator.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Validate an attribution request.
    ///
    /// Checks, in order, short-circuiting on the first failure:
    /// 1. the client exists and is active,
    /// 2. the card exists in inventory,
    /// 3. the card is available, or already held by this same client
    ///    (idempotent re-attribution). A back-reference to a vanished
    ///    client does not reject the request; it is reported as an orphan
    ///    for the executor to self-heal,
    /// 4. the client does not already hold a different card.
    pub async fn validate(&self, client_id: i64, sim_number: &str) -> AttributionResult<Validation> {
        let Some(client) = Client::find_active_by_id(&self.pool, client_id).await? else {
            return Ok(Validation::Rejected(RejectReason::ClientNotFound {
                client_id,
            }));
        };

        let Some(sim) = SimCard::find_by_number(&self.pool, sim_number).await? else {
            return Ok(Validation::Rejected(RejectReason::SimNotFound {
                number: sim_number.to_string(),
            }));
        };

        let mut orphaned_owner = false;
        if sim.status == SimStatus::Assigned {
            match sim.owner_client_id {
                // Idempotent re-attribution to the current holder.
                Some(owner_id) if owner_id == client_id => {}
                Some(owner_id) => {
                    match Client::find_active_by_id(&self.pool, owner_id).await? {
                        Some(holder) => {
                            return Ok(Validation::Rejected(RejectReason::SimAlreadyAssigned {
                                number: sim.number,
                                holder: holder.name,
                            }));
                        }
                        // Holder vanished or is soft deleted: orphan, not a rejection.
                        None => orphaned_owner = true,
                    }
                }
                // Assigned with no owner at all is stale state; treat like an orphan.
                None => orphaned_owner = true,
            }
        }

        if let Some(current) = &client.sim_number {
            if current != sim_number {
                return Ok(Validation::Rejected(RejectReason::ClientAlreadyHasSim {
                    current: current.clone(),
                }));
            }
        }

        Ok(Validation::Valid { orphaned_owner })
    }
}
