//! Batch jobs and scheduling

pub mod plan;
pub mod subscription_scan;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

pub use plan::ScanPlan;
pub use subscription_scan::{ScanServices, ScanSettings, ScanSummary, SubscriptionScanner};

/// Every 15 minutes, at second 0
pub const DEFAULT_SCAN_SCHEDULE: &str = "0 */15 * * * *";

/// Initialize and start the job scheduler
pub async fn start_scheduler(
    scanner: Arc<SubscriptionScanner>,
    schedule: &str,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // A slow scan must not overlap the next tick
    let running = Arc::new(Mutex::new(()));
    let scan_job = Job::new_async(schedule, move |_uuid, _l| {
        let scanner = scanner.clone();
        let running = running.clone();
        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                warn!("Previous subscription scan still running, skipping tick");
                return;
            };
            info!("Running subscription scan");
            if let Err(e) = scanner.run().await {
                tracing::error!("Subscription scan error: {:#}", e);
            }
        })
    })?;
    scheduler.add(scan_job).await?;

    scheduler.start().await?;

    info!(schedule = %schedule, "Job scheduler started");
    Ok(scheduler)
}
