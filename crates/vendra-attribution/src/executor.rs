//! Attribution execution.
//!
//! Performs the two-sided client/SIM mutation as a single transaction so
//! the denormalized pair can never half-commit. Concurrent attribution
//! attempts for the same card or the same client are serialized by row
//! locks taken inside the transaction (client first, then card), and
//! both sides are re-checked under those locks.

use sqlx::PgPool;
use tracing::{info, warn};

use vendra_db::models::{Client, SimCard, SimStatus};
use vendra_db::DbError;

use crate::error::{AttributionError, AttributionResult, RejectReason};
use crate::validator::{AttributionValidator, Validation};

/// Result of a successful attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionOutcome {
    /// Client now holding the card.
    pub client_id: i64,
    /// Card number attributed.
    pub sim_number: String,
    /// Human-readable confirmation for the caller.
    pub message: String,
}

/// Executes attribution and release requests.
#[derive(Clone)]
pub struct AttributionExecutor {
    pool: PgPool,
    validator: AttributionValidator,
}

impl AttributionExecutor {
    /// Create a new executor.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            validator: AttributionValidator::new(pool.clone()),
            pool,
        }
    }

    /// Access the underlying validator, for callers that only want the
    /// decision without the mutation.
    #[must_use]
    pub fn validator(&self) -> &AttributionValidator {
        &self.validator
    }

    /// Attribute a SIM card to a client.
    ///
    /// Runs validation first. If validation flags the card as orphaned
    /// (back-reference to a vanished client), the orphan is cleared in
    /// place and validation runs once more. The mutation itself commits
    /// both sides of the pair in one transaction, with the client and
    /// card rows locked for the duration.
    ///
    /// When `vendor_code` is `None`, the card inherits the client's.
    pub async fn attribute(
        &self,
        client_id: i64,
        sim_number: &str,
        vendor_code: Option<&str>,
    ) -> AttributionResult<AttributionOutcome> {
        let mut validation = self.validator.validate(client_id, sim_number).await?;

        if let Validation::Valid {
            orphaned_owner: true,
        } = validation
        {
            warn!(
                sim_number = %sim_number,
                "SIM back-reference points to a vanished client; clearing orphan before attribution"
            );
            SimCard::release(&self.pool, sim_number).await?;
            validation = self.validator.validate(client_id, sim_number).await?;
        }

        if let Validation::Rejected(reason) = validation {
            return Err(AttributionError::Rejected(reason));
        }

        // Validation passed against a snapshot; the transaction below
        // re-checks both sides under row locks so two concurrent requests
        // cannot both claim the card, or both hand a card to the client.
        // Lock order is client then card, matching `release`.
        let mut tx = self.pool.begin().await.map_err(DbError::QueryFailed)?;

        let client = Client::lock_active_by_id_in_tx(&mut tx, client_id)
            .await?
            .ok_or(AttributionError::Rejected(RejectReason::ClientNotFound {
                client_id,
            }))?;

        if let Some(current) = client.sim_number.as_deref() {
            if current != sim_number {
                // A concurrent attribution gave this client a card first.
                tx.rollback().await.map_err(DbError::QueryFailed)?;
                return Err(AttributionError::Rejected(
                    RejectReason::ClientAlreadyHasSim {
                        current: current.to_string(),
                    },
                ));
            }
        }

        let vendor = vendor_code
            .map(str::to_owned)
            .or_else(|| client.vendor_code.clone());

        let sim = SimCard::lock_by_number_in_tx(&mut tx, sim_number)
            .await?
            .ok_or_else(|| {
                AttributionError::Rejected(RejectReason::SimNotFound {
                    number: sim_number.to_string(),
                })
            })?;

        if sim.status == SimStatus::Assigned && sim.owner_client_id != Some(client_id) {
            // Lost the race to a concurrent attribution.
            tx.rollback().await.map_err(DbError::QueryFailed)?;
            let holder = match sim.owner_client_id {
                Some(owner_id) => Client::find_by_id(&self.pool, owner_id)
                    .await?
                    .map_or_else(|| format!("client {owner_id}"), |c| c.name),
                None => "another client".to_string(),
            };
            return Err(AttributionError::Rejected(
                RejectReason::SimAlreadyAssigned {
                    number: sim.number,
                    holder,
                },
            ));
        }

        Client::set_sim_number_in_tx(&mut tx, client_id, Some(sim_number)).await?;
        SimCard::assign_in_tx(&mut tx, sim_number, client_id, vendor.as_deref()).await?;

        tx.commit().await.map_err(DbError::QueryFailed)?;

        info!(
            client_id = client_id,
            sim_number = %sim_number,
            vendor_code = ?vendor,
            "SIM card attributed"
        );

        Ok(AttributionOutcome {
            client_id,
            sim_number: sim_number.to_string(),
            message: format!("SIM card {sim_number} attributed to {}", client.name),
        })
    }

    /// Release whatever SIM card a client currently holds.
    ///
    /// Symmetric to [`Self::attribute`]: both sides are cleared in one
    /// transaction, with the card reset to available and its attribution
    /// timestamps removed. Releasing a client that holds nothing is a
    /// no-op, which keeps the operation safe to retry.
    pub async fn release(&self, client_id: i64) -> AttributionResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::QueryFailed)?;

        // Same client-then-card lock order as `attribute`, and the SIM
        // reference is read under the lock so a concurrent attribution
        // cannot slip a card in between the read and the clear.
        let client = Client::lock_active_by_id_in_tx(&mut tx, client_id)
            .await?
            .ok_or(AttributionError::Rejected(RejectReason::ClientNotFound {
                client_id,
            }))?;

        let Some(number) = client.sim_number else {
            tx.rollback().await.map_err(DbError::QueryFailed)?;
            return Ok(());
        };

        // Lock the card if it still exists; the client side is cleared
        // either way so a dangling reference cannot survive a release.
        let sim = SimCard::lock_by_number_in_tx(&mut tx, &number).await?;

        Client::set_sim_number_in_tx(&mut tx, client_id, None).await?;
        if sim.is_some() {
            SimCard::release_in_tx(&mut tx, &number).await?;
        }

        tx.commit().await.map_err(DbError::QueryFailed)?;

        info!(
            client_id = client_id,
            sim_number = %number,
            "SIM card released"
        );

        Ok(())
    }
}
