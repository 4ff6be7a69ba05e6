//! SyncWorker - background queue drain
//!
//! Periodically drains the offline order queue for hosts that want
//! hands-off reconciliation. After a round with failures the next scan is
//! delayed with exponential backoff; a clean round returns to the regular
//! interval. Shutdown via CancellationToken.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::SyncCoordinator;

/// Backoff after a failed round
const INITIAL_BACKOFF_SECS: u64 = 5;
/// Backoff ceiling
const MAX_BACKOFF_SECS: u64 = 300;

pub struct SyncWorker {
    coordinator: Arc<SyncCoordinator>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl SyncWorker {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            interval,
            shutdown,
        }
    }

    /// Main run loop - drain, sleep, repeat until shutdown
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "sync worker started");
        let mut delay = self.interval;
        let mut backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.coordinator.sync_all().await {
                Ok(report) if report.fully_synced() => {
                    if report.total > 0 {
                        tracing::info!(synced = report.synced, "background drain complete");
                    }
                    delay = self.interval;
                    backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);
                }
                Ok(report) => {
                    tracing::warn!(
                        synced = report.synced,
                        total = report.total,
                        backoff_secs = backoff.as_secs(),
                        "background drain left failures, backing off"
                    );
                    delay = backoff;
                    backoff = (backoff * 2).min(Duration::from_secs(MAX_BACKOFF_SECS));
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "background drain failed, backing off"
                    );
                    delay = backoff;
                    backoff = (backoff * 2).min(Duration::from_secs(MAX_BACKOFF_SECS));
                }
            }
        }

        tracing::info!("sync worker stopped");
    }
}
