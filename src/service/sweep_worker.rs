//! Background sweep worker
//!
//! Runs periodically to drain file records left behind by deleted
//! partitions, e.g. when a partition deletion's own sweep could not reach
//! the blob store.

use crate::config::SweepConfig;
use crate::service::sweep_service::SweepService;
use log::{error, info};
use std::time::Duration;
use tokio::time;

/// Background orphan sweep worker
pub struct SweepWorker {
    sweeper: SweepService,
    interval: Duration,
}

impl SweepWorker {
    pub fn new(sweeper: SweepService, config: &SweepConfig) -> Self {
        Self {
            sweeper,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }

    /// Start the sweep worker as a background task (non-blocking)
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        info!("Starting sweep worker with {}s interval", self.interval.as_secs());

        tokio::spawn(async move {
            let mut interval = time::interval(self.interval);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                self.run_once().await;
            }
        })
    }

    /// One sweep over all orphaned partitions
    pub async fn run_once(&self) {
        match self.sweeper.sweep_orphans().await {
            Ok(report) if report.dispatched > 0 => info!(
                "Orphan sweep removed {} of {} files",
                report.removed, report.dispatched
            ),
            Ok(_) => {}
            Err(e) => error!("Error sweeping orphaned partitions: {}", e),
        }
    }
}
