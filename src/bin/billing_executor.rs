//! Daily scheduled-billing batch.
//!
//! Meant to be triggered once a day by an external scheduler. Exits
//! non-zero when any schedule or tenant failed, so the trigger can alert
//! and rerun; reruns are safe.

use std::sync::Arc;

use tracing::{error, info};

use billing_scheduler::clock::SystemClock;
use billing_scheduler::config::Config;
use billing_scheduler::executor::Executor;
use billing_scheduler::index::{init_index_source, MonetaryIndex};
use billing_scheduler::storage::init_storage;
use billing_scheduler::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let store = init_storage(&config.storage).await?;
    let source = init_index_source(&config.index).await?;
    info!(index = %source.describe(), "Index source ready");
    let index = Arc::new(MonetaryIndex::new(source));

    let executor = Executor::from_config(
        &config.executor,
        &config.storage,
        store,
        index,
        Arc::new(SystemClock),
    )?;

    match executor.run_daily_batch().await {
        Ok(report) => {
            info!(issued = report.advanced(), "Scheduled billing batch complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Scheduled billing batch failed");
            Err(e.into())
        }
    }
}
