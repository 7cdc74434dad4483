use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hearthcal_core::SyncScheduler;
use tracing::info;

use crate::AppSynchronizer;

pub async fn run(synchronizer: Arc<AppSynchronizer>, interval: Duration) -> Result<()> {
    let handle = SyncScheduler::new(synchronizer)
        .with_interval(interval)
        .start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.stop().await;

    Ok(())
}
