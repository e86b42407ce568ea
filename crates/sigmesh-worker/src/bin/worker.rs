//! Long-running sigmesh worker.
//!
//! Runs the interval workflow scheduler and the retry-queue consumer until
//! interrupted. Configuration comes from the environment (`DATABASE_URL`
//! plus the `SIGMESH_*` overrides).

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use sigmesh_core::{defaults, EnrichmentConfig};
use sigmesh_worker::{bootstrap, RetryWorker, RetryWorkerConfig, WorkflowScheduler};

#[derive(Parser)]
#[command(name = "sigmesh-worker")]
#[command(author, version, about = "Signal enrichment worker")]
struct Cli {
    /// Override the seconds between scheduled enrichment runs
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Override the activities fetched per batch
    #[arg(long)]
    batch_size: Option<i64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    bootstrap::init_tracing();

    let cli = Cli::parse();
    let mut config = EnrichmentConfig::from_env();
    if let Some(interval_secs) = cli.interval_secs {
        config.batch.interval_secs = interval_secs.max(1);
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch.batch_size = batch_size.max(1);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Worker exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: EnrichmentConfig) -> sigmesh_core::Result<()> {
    let components = bootstrap::build(config).await?;

    // Expired dead letters are pruned at startup rather than on a timer;
    // worker restarts are frequent enough in practice.
    match components
        .database
        .dead_letter
        .purge_older_than(defaults::QUEUE_RETENTION_DAYS as u32)
        .await
    {
        Ok(purged) if purged > 0 => {
            info!(purged, "Purged expired dead-letter messages")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Dead-letter purge failed"),
    }

    let scheduler = WorkflowScheduler::new(
        components.batch.clone(),
        components.clustering.clone(),
        &components.config.batch,
        components.config.scheduler.clone(),
    );
    let scheduler_handle = scheduler.start();

    let retry_worker = RetryWorker::new(
        components.database.retry_queue.clone(),
        components.retry.clone(),
        components.batch.clone(),
        RetryWorkerConfig::default(),
    );
    let retry_handle = retry_worker.start();

    info!("Worker running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(sigmesh_core::Error::Io)?;

    info!("Shutting down");
    scheduler_handle.shutdown().await?;
    retry_handle.shutdown().await?;
    Ok(())
}
