//! Sync Sweep Worker
//!
//! Background worker that keeps reconciliation moving: requeues retryable
//! failed sync logs, promotes frequent peers and purges old terminal logs.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::reconciler::SyncReconciler;
use crate::audit::AuditContext;
use crate::error::LedgerError;
use crate::peer::PeerTracker;

/// Configuration for the sweep worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to run a sweep
    pub scan_interval: Duration,
    /// Failed logs with this many attempts are no longer requeued
    pub max_attempts: i32,
    /// Maximum logs requeued per sweep
    pub batch_size: i64,
    /// Peers reaching this counter become trusted. `None` disables promotion.
    pub auto_trust_threshold: Option<i64>,
    /// Terminal logs older than this many days are purged. `None` keeps them.
    pub retention_days: Option<i64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            max_attempts: 5,
            batch_size: 100,
            auto_trust_threshold: Some(10),
            retention_days: Some(30),
        }
    }
}

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub retried: usize,
    pub trusted: usize,
    pub purged: u64,
}

pub struct SyncSweepWorker {
    reconciler: Arc<SyncReconciler>,
    peers: Arc<PeerTracker>,
    config: WorkerConfig,
}

impl SyncSweepWorker {
    pub fn new(
        reconciler: Arc<SyncReconciler>,
        peers: Arc<PeerTracker>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            reconciler,
            peers,
            config,
        }
    }

    pub fn with_defaults(reconciler: Arc<SyncReconciler>, peers: Arc<PeerTracker>) -> Self {
        Self::new(reconciler, peers, WorkerConfig::default())
    }

    /// Sweep every `scan_interval` until `shutdown` flips to true or its
    /// sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            max_attempts = self.config.max_attempts,
            batch_size = self.config.batch_size,
            "Starting sync sweep worker"
        );

        let mut ticker = tokio::time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        error!(error = %e, "Sync sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Sync sweep worker stopped");
    }

    /// Run a single sweep
    pub async fn scan_once(&self) -> Result<SweepReport, LedgerError> {
        let ctx = AuditContext::system();
        let mut report = SweepReport::default();

        let retryable = self
            .reconciler
            .syncs_needing_retry(self.config.max_attempts, self.config.batch_size)
            .await?;
        for log in &retryable {
            match self.reconciler.retry_sync(log.id, &ctx).await {
                Ok(_) => report.retried += 1,
                // moved on since the listing
                Err(e) if e.is_conflict() => {
                    debug!(sync_log_id = %log.id, error = %e, "Skipped requeue");
                }
                Err(e) => {
                    error!(sync_log_id = %log.id, error = %e, "Failed to requeue sync log");
                }
            }
        }

        if let Some(threshold) = self.config.auto_trust_threshold {
            report.trusted = self
                .peers
                .auto_trust_frequent_peers(threshold, &ctx)
                .await?
                .len();
        }

        if let Some(days) = self.config.retention_days {
            report.purged = self.reconciler.delete_old_sync_logs(days).await?;
        }

        if report == SweepReport::default() {
            debug!("Sync sweep found nothing to do");
        } else {
            info!(
                retried = report.retried,
                trusted = report.trusted,
                purged = report.purged,
                "Sync sweep completed"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;

    fn worker(config: WorkerConfig) -> SyncSweepWorker {
        let store = Arc::new(MemoryLedgerStore::new());
        SyncSweepWorker::new(
            Arc::new(SyncReconciler::new(store.clone())),
            Arc::new(PeerTracker::new(store)),
            config,
        )
    }

    #[tokio::test]
    async fn test_empty_sweep() {
        let report = worker(WorkerConfig::default()).scan_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_invalid_threshold_surfaces() {
        let w = worker(WorkerConfig {
            auto_trust_threshold: Some(0),
            ..WorkerConfig::default()
        });
        assert!(matches!(
            w.scan_once().await,
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_huge_retention_keeps_sweeping() {
        let w = worker(WorkerConfig {
            retention_days: Some(i64::MAX),
            ..WorkerConfig::default()
        });
        assert_eq!(w.scan_once().await.unwrap().purged, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let w = worker(WorkerConfig {
            scan_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        });
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { w.run(rx).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
