//! Background reconciliation worker.
//!
//! Owns the periodic reconciliation loop: a fixed-interval tick, graceful
//! shutdown, and no overlapping passes (each pass is awaited inline before
//! the next tick is honored).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::reconcile::ReconciliationEngine;

/// Reconcile worker configuration.
#[derive(Debug, Clone)]
pub struct ReconcileWorkerConfig {
    /// How often to run a full reconciliation pass (in seconds).
    pub reconcile_interval_secs: u64,
}

impl Default for ReconcileWorkerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 300,
        }
    }
}

/// Periodically runs the reconciliation engine.
pub struct ReconcileWorker {
    engine: Arc<ReconciliationEngine>,
    config: ReconcileWorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl ReconcileWorker {
    /// Create a new worker.
    #[must_use]
    pub fn new(engine: Arc<ReconciliationEngine>, config: ReconcileWorkerConfig) -> Self {
        Self {
            engine,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Request the worker to stop after the current pass.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Run the worker until shutdown is requested.
    ///
    /// A failed pass is logged and the loop continues; transient storage
    /// errors heal on a later tick.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            reconcile_interval_secs = self.config.reconcile_interval_secs,
            "Starting reconcile worker"
        );

        let mut tick = interval(Duration::from_secs(self.config.reconcile_interval_secs));
        // The first tick of a tokio interval fires immediately; skip it so
        // the first pass happens one full interval after startup.
        tick.tick().await;

        loop {
            tick.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self.engine.reconcile().await {
                Ok(stats) if stats.total() > 0 => {
                    warn!(
                        orphans_released = stats.orphans_released,
                        client_side_repairs = stats.client_side_repairs,
                        sim_side_repairs = stats.sim_side_repairs,
                        vendor_codes_propagated = stats.vendor_codes_propagated,
                        residual = stats.residual_findings,
                        "Reconciliation repaired drift"
                    );
                }
                Ok(_) => debug!("Reconciliation pass found nothing to repair"),
                Err(e) => error!(error = %e, "Reconciliation pass failed"),
            }
        }

        info!("Reconcile worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ReconcileWorkerConfig::default();
        assert_eq!(config.reconcile_interval_secs, 300);
    }
}
