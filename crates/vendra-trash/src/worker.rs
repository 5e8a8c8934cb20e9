//! Background purge worker.
//!
//! Runs the expiry purge on its own timer, independent of the
//! reconciliation worker's schedule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::service::TrashService;

/// Purge worker configuration.
#[derive(Debug, Clone)]
pub struct PurgeWorkerConfig {
    /// How often to sweep for expired rows (in seconds).
    pub purge_interval_secs: u64,
}

impl Default for PurgeWorkerConfig {
    fn default() -> Self {
        Self {
            purge_interval_secs: 3600,
        }
    }
}

/// Periodically hard-deletes rows past their recovery window.
pub struct PurgeWorker {
    service: Arc<TrashService>,
    config: PurgeWorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl PurgeWorker {
    /// Create a new worker.
    #[must_use]
    pub fn new(service: Arc<TrashService>, config: PurgeWorkerConfig) -> Self {
        Self {
            service,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Request the worker to stop after the current sweep.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Run the worker until shutdown is requested.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            purge_interval_secs = self.config.purge_interval_secs,
            "Starting purge worker"
        );

        let mut tick = interval(Duration::from_secs(self.config.purge_interval_secs));
        // Skip the immediate first tick; the first sweep happens one full
        // interval after startup.
        tick.tick().await;

        loop {
            tick.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self.service.purge_expired().await {
                Ok(0) => debug!("Purge sweep found nothing expired"),
                Ok(count) => info!(purged = count, "Purge sweep removed expired rows"),
                Err(e) => error!(error = %e, "Purge sweep failed"),
            }
        }

        info!("Purge worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PurgeWorkerConfig::default();
        assert_eq!(config.purge_interval_secs, 3600);
    }
}
