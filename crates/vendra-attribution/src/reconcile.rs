//! Reconciliation engine.
//!
//! Idempotent five-phase repair pass restoring the client/SIM invariants
//! across drifted state. Each phase is a set of small, self-consistent
//! corrections, so a pass that is interrupted or runs concurrently with
//! request traffic leaves nothing worse than it found; the next pass picks
//! up the remainder.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use vendra_db::models::{Client, SimCard, SimStatus};

use crate::auditor::ConsistencyAuditor;
use crate::error::AttributionResult;

/// Corrections applied by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Phase 1: cards released because their owner vanished or is inactive.
    pub orphans_released: u64,
    /// Phase 2: cards forced to match their referencing client, plus
    /// dangling client references cleared.
    pub client_side_repairs: u64,
    /// Phase 3: repairs in the SIM-to-client direction.
    pub sim_side_repairs: u64,
    /// Phase 4: vendor codes copied from owner clients.
    pub vendor_codes_propagated: u64,
    /// Phase 5: findings still reported by the audit after repair.
    pub residual_findings: u64,
}

impl ReconcileStats {
    /// Total corrections applied (phases 1-4; residuals are observations,
    /// not corrections).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.orphans_released
            + self.client_side_repairs
            + self.sim_side_repairs
            + self.vendor_codes_propagated
    }
}

/// Repairs drift between clients and their assigned SIM cards.
#[derive(Clone)]
pub struct ReconciliationEngine {
    pool: PgPool,
    auditor: ConsistencyAuditor,
}

impl ReconciliationEngine {
    /// Create a new engine.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            auditor: ConsistencyAuditor::new(pool.clone()),
            pool,
        }
    }

    /// Run a full reconciliation pass.
    ///
    /// Safe to invoke repeatedly: a second pass over unchanged state
    /// applies zero corrections. Ordering matters — orphans are cleared
    /// before references are propagated so later phases work from a pool
    /// of correctly-released cards.
    pub async fn reconcile(&self) -> AttributionResult<ReconcileStats> {
        let mut stats = ReconcileStats::default();

        stats.orphans_released = self.release_orphans().await?;
        stats.client_side_repairs = self.propagate_client_side().await?;
        stats.sim_side_repairs = self.propagate_sim_side().await?;
        stats.vendor_codes_propagated = self.propagate_vendor_codes().await?;

        let report = self.auditor.audit().await?;
        stats.residual_findings = report.total_findings();

        if stats.residual_findings == 0 {
            info!(
                corrections = stats.total(),
                "Reconciliation pass complete, no residual drift"
            );
        } else {
            warn!(
                corrections = stats.total(),
                residual = stats.residual_findings,
                "Reconciliation pass complete with residual drift"
            );
        }

        Ok(stats)
    }

    /// Narrow repair path for a single client.
    ///
    /// Invoked synchronously after operations known to disturb one pair
    /// (for example an operator-forced edit), without waiting for the next
    /// scheduled full pass.
    pub async fn reconcile_one(&self, client_id: i64) -> AttributionResult<()> {
        let client = Client::find_active_by_id(&self.pool, client_id).await?;

        // Cards whose back-reference names this client.
        let owned = SimCard::find_by_owner(&self.pool, client_id).await?;

        match client {
            None => {
                // Client is gone or deleted: every card naming it is an orphan.
                for sim in owned {
                    SimCard::release(&self.pool, &sim.number).await?;
                    debug!(client_id, sim_number = %sim.number, "Released orphaned SIM");
                }
            }
            Some(client) => {
                let reference = client.sim_number.as_deref();

                // Release cards the client does not actually reference.
                for sim in &owned {
                    if reference != Some(sim.number.as_str()) {
                        SimCard::release(&self.pool, &sim.number).await?;
                        debug!(client_id, sim_number = %sim.number, "Released stale SIM");
                    }
                }

                // Force the referenced card to agree with the client.
                if let Some(number) = reference {
                    match SimCard::find_by_number(&self.pool, number).await? {
                        None => {
                            // Referenced card no longer exists.
                            Client::set_sim_number(&self.pool, client_id, None).await?;
                            debug!(client_id, sim_number = %number, "Cleared dangling SIM reference");
                        }
                        Some(sim) if self.card_paired_elsewhere(&sim, client_id).await? => {
                            Client::set_sim_number(&self.pool, client_id, None).await?;
                            debug!(client_id, sim_number = %number, "Cleared reference to SIM held by another client");
                        }
                        Some(_) => {
                            SimCard::force_attach(&self.pool, number, client_id).await?;
                            if let Some(vendor) = client.vendor_code.as_deref() {
                                SimCard::set_vendor_code(&self.pool, number, vendor).await?;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Check whether a card is already consistently paired with an active
    /// client other than `client_id` (the owner's reference names the card
    /// back). Such a pair satisfies the invariants and must not be broken
    /// up by a competing reference.
    async fn card_paired_elsewhere(
        &self,
        sim: &SimCard,
        client_id: i64,
    ) -> AttributionResult<bool> {
        if sim.status != SimStatus::Assigned {
            return Ok(false);
        }
        let Some(owner_id) = sim.owner_client_id else {
            return Ok(false);
        };
        if owner_id == client_id {
            return Ok(false);
        }
        let owner = Client::find_active_by_id(&self.pool, owner_id).await?;
        Ok(owner.is_some_and(|owner| owner.sim_number.as_deref() == Some(sim.number.as_str())))
    }

    /// Phase 1: release every assigned card whose owner is missing or inactive.
    async fn release_orphans(&self) -> AttributionResult<u64> {
        let mut released = 0;
        for sim in SimCard::list_assigned(&self.pool).await? {
            let owner_active = match sim.owner_client_id {
                Some(owner_id) => Client::find_active_by_id(&self.pool, owner_id)
                    .await?
                    .is_some(),
                None => false,
            };
            if !owner_active && SimCard::release(&self.pool, &sim.number).await? {
                debug!(sim_number = %sim.number, owner = ?sim.owner_client_id, "Phase 1: released orphaned SIM");
                released += 1;
            }
        }
        Ok(released)
    }

    /// Phase 2: make every referenced card agree with its client.
    ///
    /// The client side is authoritative here: it is the side edited
    /// directly by users, so the card is forced to match it. A reference
    /// to a card that no longer exists is cleared from the client instead.
    async fn propagate_client_side(&self) -> AttributionResult<u64> {
        let mut repaired = 0;
        for client in Client::list_with_sim_ref(&self.pool).await? {
            let Some(number) = client.sim_number.as_deref() else {
                continue;
            };
            match SimCard::find_by_number(&self.pool, number).await? {
                None => {
                    // Dangling reference; nothing to force, clear it.
                    if Client::set_sim_number(&self.pool, client.id, None).await? {
                        debug!(client_id = client.id, sim_number = %number, "Phase 2: cleared dangling reference");
                        repaired += 1;
                    }
                }
                Some(sim) => {
                    let agrees = sim.status == SimStatus::Assigned
                        && sim.owner_client_id == Some(client.id);
                    if agrees {
                        continue;
                    }
                    if self.card_paired_elsewhere(&sim, client.id).await? {
                        // Two active clients reference the same card. The
                        // consistently paired holder keeps it; stealing it
                        // back and forth would never converge.
                        if Client::set_sim_number(&self.pool, client.id, None).await? {
                            debug!(client_id = client.id, sim_number = %number, "Phase 2: cleared reference to SIM held by another client");
                            repaired += 1;
                        }
                    } else if SimCard::force_attach(&self.pool, number, client.id).await? {
                        debug!(client_id = client.id, sim_number = %number, "Phase 2: forced SIM to match client");
                        repaired += 1;
                    }
                }
            }
        }
        Ok(repaired)
    }

    /// Phase 3: symmetric catch in the SIM-to-client direction.
    ///
    /// Phase 1 should already have released cards with dead owners; this
    /// phase re-checks (state may have moved under us) and then makes sure
    /// the owner's reference names the card. An owner that references a
    /// *different* card is authoritative, so the stale card is released
    /// rather than the client overwritten.
    async fn propagate_sim_side(&self) -> AttributionResult<u64> {
        let mut repaired = 0;
        for sim in SimCard::list_assigned(&self.pool).await? {
            let owner = match sim.owner_client_id {
                Some(owner_id) => Client::find_active_by_id(&self.pool, owner_id).await?,
                None => None,
            };
            match owner {
                None => {
                    if SimCard::release(&self.pool, &sim.number).await? {
                        debug!(sim_number = %sim.number, "Phase 3: released orphaned SIM");
                        repaired += 1;
                    }
                }
                Some(client) => match client.sim_number.as_deref() {
                    Some(number) if number == sim.number => {}
                    None => {
                        if Client::set_sim_number(&self.pool, client.id, Some(&sim.number)).await? {
                            debug!(client_id = client.id, sim_number = %sim.number, "Phase 3: restored client reference");
                            repaired += 1;
                        }
                    }
                    Some(_) => {
                        // Client references another card; this one is stale.
                        if SimCard::release(&self.pool, &sim.number).await? {
                            debug!(client_id = client.id, sim_number = %sim.number, "Phase 3: released stale SIM");
                            repaired += 1;
                        }
                    }
                },
            }
        }
        Ok(repaired)
    }

    /// Phase 4: copy vendor codes from owner clients onto their cards.
    async fn propagate_vendor_codes(&self) -> AttributionResult<u64> {
        let mut propagated = 0;
        for sim in SimCard::list_assigned(&self.pool).await? {
            let Some(owner_id) = sim.owner_client_id else {
                continue;
            };
            let Some(client) = Client::find_active_by_id(&self.pool, owner_id).await? else {
                continue;
            };
            if let Some(vendor) = client.vendor_code.as_deref() {
                if sim.vendor_code.as_deref() != Some(vendor)
                    && SimCard::set_vendor_code(&self.pool, &sim.number, vendor).await?
                {
                    debug!(sim_number = %sim.number, vendor_code = %vendor, "Phase 4: propagated vendor code");
                    propagated += 1;
                }
            }
        }
        Ok(propagated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_total_excludes_residuals() {
        let stats = ReconcileStats {
            orphans_released: 1,
            client_side_repairs: 2,
            sim_side_repairs: 3,
            vendor_codes_propagated: 4,
            residual_findings: 99,
        };
        assert_eq!(stats.total(), 10);
    }

    #[test]
    fn test_stats_default_is_zero() {
        let stats = ReconcileStats::default();
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.residual_findings, 0);
    }

    #[test]
    fn test_stats_roundtrip() {
        let stats = ReconcileStats {
            orphans_released: 1,
            ..ReconcileStats::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: ReconcileStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
