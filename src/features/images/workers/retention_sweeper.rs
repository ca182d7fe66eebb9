use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::features::images::services::{ImageService, SweepReport};

/// Background worker that removes expired images on a fixed period
pub struct RetentionSweeper {
    image_service: Arc<ImageService>,
    period: Duration,
}

impl RetentionSweeper {
    pub fn new(image_service: Arc<ImageService>, period: Duration) -> Self {
        Self {
            image_service,
            period,
        }
    }

    /// Run the sweeper forever. The first sweep happens immediately.
    pub async fn run(&self) {
        tracing::info!(
            "Starting retention sweeper (every {}s)",
            self.period.as_secs()
        );

        let mut interval = interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    /// One sweep. Failures are logged; the next tick tries again.
    pub async fn sweep_once(&self) -> Option<SweepReport> {
        match self.image_service.purge_expired().await {
            Ok(report) => {
                if report.records_removed > 0 {
                    tracing::info!(
                        "Retention sweep removed {} images ({} files deleted, {} already gone, {} failed)",
                        report.records_removed,
                        report.files_removed,
                        report.files_missing,
                        report.files_failed
                    );
                } else {
                    tracing::debug!("Retention sweep found nothing to remove");
                }
                if report.admissions_pruned > 0 {
                    tracing::debug!(
                        "Dropped {} quota entries outside the window",
                        report.admissions_pruned
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::error!("Retention sweep failed: {:?}", e);
                None
            }
        }
    }
}
