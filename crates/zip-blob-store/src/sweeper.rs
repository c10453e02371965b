//! Background retention sweep
//!
//! Periodically lists the store and deletes archives whose modification time
//! is older than the TTL. Failures on individual archives are logged and the
//! sweep moves on; the loop itself only ends when cancelled.

use crate::store::BlobStore;
use crate::types::SweepReport;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shortest period the sweep loop will run at
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the retention sweeper
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweep cycles (default: 1 hour)
    pub interval: Duration,
    /// Archives older than this are deleted (default: 24 hours)
    pub ttl: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Handle to a running sweeper task
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the current cycle, if any, to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }
    }
}

/// Spawn the sweep loop. The first cycle runs immediately.
pub fn spawn_sweeper(store: Arc<BlobStore>, config: SweepConfig) -> SweeperHandle {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let task = tokio::spawn(async move {
        run_sweep_loop(store, config, cancel_clone).await;
    });

    SweeperHandle { cancel, task }
}

async fn run_sweep_loop(store: Arc<BlobStore>, config: SweepConfig, cancel: CancellationToken) {
    let period = config.interval.max(MIN_INTERVAL);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = period.as_secs(),
        ttl_secs = config.ttl.as_secs(),
        "Retention sweeper started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Retention sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                sweep_once(&store, config.ttl, Utc::now()).await;
            }
        }
    }
}

/// Run one sweep cycle as of `now`, deleting archives modified strictly before `now - ttl`
pub async fn sweep_once(store: &BlobStore, ttl: Duration, now: DateTime<Utc>) -> SweepReport {
    let cutoff = TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut report = SweepReport::default();

    let listings = match store.list().await {
        Ok(listings) => listings,
        Err(e) => {
            warn!(root = ?store.root(), error = %e, "Failed to list store for sweep");
            report.failed += 1;
            return report;
        }
    };

    for listing in listings {
        report.scanned += 1;
        if listing.modified >= cutoff {
            continue;
        }

        match store.delete(&listing.id).await {
            Ok(()) => {
                info!(id = %listing.id, modified = %listing.modified, "Deleted expired archive");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(id = %listing.id, error = %e, "Failed to delete expired archive");
                report.failed += 1;
            }
        }
    }

    info!(
        scanned = report.scanned,
        deleted = report.deleted,
        failed = report.failed,
        cutoff = %cutoff,
        "Sweep cycle completed"
    );

    report
}
