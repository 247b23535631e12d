//! Collector service: drives collection on a schedule and commits to the store

use crate::collector::{CollectError, SnapshotCollector};
use leakscope_core::{DetectorConfig, GraphStore, SnapshotId, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exponential backoff after `failures` consecutive failed collections.
pub fn backoff_delay(base: Duration, failures: u32, max: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(failures.min(16))).min(max)
}

/// Runs the collector on a fixed interval or on external triggers and
/// commits every snapshot. Committed ids are broadcast to subscribers.
pub struct CollectorService {
    collector: Arc<SnapshotCollector>,
    store: Arc<GraphStore>,
    interval: Duration,
    max_backoff: Duration,
    failure_limit: Option<u32>,
    committed_tx: broadcast::Sender<SnapshotId>,
    trigger: Arc<Notify>,
}

impl CollectorService {
    pub fn new(collector: Arc<SnapshotCollector>, store: Arc<GraphStore>, config: &DetectorConfig) -> Self {
        let (committed_tx, _) = broadcast::channel(64);
        Self {
            collector,
            store,
            interval: config.sampling_interval(),
            max_backoff: config.max_backoff(),
            failure_limit: None,
            committed_tx,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Stop `run` after this many consecutive collection failures.
    pub fn with_failure_limit(mut self, limit: u32) -> Self {
        self.failure_limit = Some(limit);
        self
    }

    /// Receive the id of every committed snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotId> {
        self.committed_tx.subscribe()
    }

    /// Handle for requesting an immediate collection.
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Collect one snapshot and commit it.
    pub async fn collect_once(&self) -> Result<SnapshotId, ServiceError> {
        let snapshot = self.collector.collect().await?;
        let id = self.store.commit(snapshot)?;

        if let Err(e) = self.committed_tx.send(id) {
            debug!("No subscribers for snapshot {}: {}", id, e);
        }
        Ok(id)
    }

    /// Collect until `shutdown` flips to true (or its sender is dropped), or
    /// until the failure limit is reached.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            "Collecting from {} every {:?}",
            self.collector.host_name(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => debug!("Collection triggered externally"),
            }
            if *shutdown.borrow() {
                break;
            }

            match self.collect_once().await {
                Ok(id) => {
                    failures = 0;
                    debug!("Committed snapshot {}", id);
                }
                Err(ServiceError::Collect(e)) => {
                    failures += 1;
                    if self.failure_limit.is_some_and(|limit| failures >= limit) {
                        warn!("Giving up after {} failed collections: {}", failures, e);
                        break;
                    }
                    let delay = backoff_delay(self.interval, failures, self.max_backoff);
                    warn!("{} (attempt {}, retrying in {:?})", e, failures, delay);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(ServiceError::Store(e)) => {
                    // Integration defect: this snapshot is lost, the service is not.
                    error!("Commit rejected: {}", e);
                }
            }
        }

        info!("Collector service stopped");
        Ok(())
    }
}
