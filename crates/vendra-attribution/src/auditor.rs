//! Consistency audit.
//!
//! Read-only scan of the client/SIM pair that makes drift observable
//! without repairing anything. The reconciliation engine shares the same
//! invariants but acts on them; the auditor exists so drift can be
//! reported and alerted on independently of the repair logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use vendra_db::models::{Client, SimCard, SimStatus};

use crate::error::AttributionResult;

/// Maximum offending rows sampled per finding category.
///
/// The report is for operator visibility, not a full dump; counts carry
/// the totals, samples carry enough context to start digging.
pub const MAX_SAMPLES: usize = 10;

/// Findings from one audit pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Assigned cards whose back-reference names a missing or inactive client.
    pub orphaned_sims: u64,
    /// Two-sided cross-reference disagreements (either direction).
    pub reference_mismatches: u64,
    /// Assigned cards whose vendor code disagrees with their owner's.
    pub vendor_mismatches: u64,
    /// Sampled orphaned card numbers.
    pub orphan_samples: Vec<String>,
    /// Sampled cross-reference mismatch descriptions.
    pub mismatch_samples: Vec<String>,
    /// Sampled vendor mismatch descriptions.
    pub vendor_samples: Vec<String>,
    /// When the pass ran.
    pub audited_at: DateTime<Utc>,
}

impl AuditReport {
    /// Create an empty report stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orphaned_sims: 0,
            reference_mismatches: 0,
            vendor_mismatches: 0,
            orphan_samples: Vec::new(),
            mismatch_samples: Vec::new(),
            vendor_samples: Vec::new(),
            audited_at: Utc::now(),
        }
    }

    /// Check if the pass found no drift at all.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.total_findings() == 0
    }

    /// Total findings across all categories.
    #[must_use]
    pub fn total_findings(&self) -> u64 {
        self.orphaned_sims + self.reference_mismatches + self.vendor_mismatches
    }
}

impl Default for AuditReport {
    fn default() -> Self {
        Self::new()
    }
}

fn push_sample(samples: &mut Vec<String>, sample: String) {
    if samples.len() < MAX_SAMPLES {
        samples.push(sample);
    }
}

/// Scans both sides of the client/SIM pair and reports drift.
#[derive(Clone)]
pub struct ConsistencyAuditor {
    pool: PgPool,
}

impl ConsistencyAuditor {
    /// Create a new auditor.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run one audit pass.
    ///
    /// Side-effect free and safe to run concurrently with everything else,
    /// including the reconciliation engine. Joins assigned cards against
    /// clients, then clients holding a reference against cards, and
    /// classifies each mismatch.
    pub async fn audit(&self) -> AttributionResult<AuditReport> {
        let mut report = AuditReport::new();

        // Forward direction: every assigned card must name an active
        // client whose reference points back at it.
        let assigned = SimCard::list_assigned(&self.pool).await?;
        for sim in &assigned {
            let owner = match sim.owner_client_id {
                Some(owner_id) => Client::find_active_by_id(&self.pool, owner_id).await?,
                None => None,
            };
            match owner {
                None => {
                    report.orphaned_sims += 1;
                    push_sample(&mut report.orphan_samples, sim.number.clone());
                }
                Some(client) => {
                    if client.sim_number.as_deref() != Some(sim.number.as_str()) {
                        report.reference_mismatches += 1;
                        push_sample(
                            &mut report.mismatch_samples,
                            format!(
                                "sim {} names client {} but client references {:?}",
                                sim.number, client.id, client.sim_number
                            ),
                        );
                    } else if client.vendor_code.is_some()
                        && sim.vendor_code != client.vendor_code
                    {
                        report.vendor_mismatches += 1;
                        push_sample(
                            &mut report.vendor_samples,
                            format!(
                                "sim {} has vendor {:?}, owner client {} has {:?}",
                                sim.number, sim.vendor_code, client.id, client.vendor_code
                            ),
                        );
                    }
                }
            }
        }

        // Reverse direction: every active client holding a reference must
        // name a card that is assigned back to it.
        let holders = Client::list_with_sim_ref(&self.pool).await?;
        for client in &holders {
            let Some(number) = client.sim_number.as_deref() else {
                continue;
            };
            let back_ok = match SimCard::find_by_number(&self.pool, number).await? {
                Some(sim) => {
                    sim.status == SimStatus::Assigned && sim.owner_client_id == Some(client.id)
                }
                None => false,
            };
            if !back_ok {
                report.reference_mismatches += 1;
                push_sample(
                    &mut report.mismatch_samples,
                    format!(
                        "client {} references sim {} which does not point back",
                        client.id, number
                    ),
                );
            }
        }

        Ok(report)
    }
}
