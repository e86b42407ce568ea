//! One-shot batch enrichment.
//!
//! Fetches one batch of unenriched activities, runs the pipeline over
//! each, and prints the result counters as JSON. Exits non-zero when any
//! activity failed outright.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use sigmesh_core::{EnrichmentConfig, EnrichmentResult};
use sigmesh_worker::bootstrap;

#[derive(Parser)]
#[command(name = "sigmesh-enrich-batch")]
#[command(author, version, about = "Run one enrichment batch")]
struct Cli {
    /// Activities to fetch (default from SIGMESH_BATCH_SIZE)
    #[arg(short, long)]
    batch_size: Option<i64>,

    /// Restrict the batch to one tenant
    #[arg(short, long)]
    tenant_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    bootstrap::init_tracing();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(result) => {
            if result.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %e, "Batch enrichment failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> sigmesh_core::Result<EnrichmentResult> {
    let components = bootstrap::build(EnrichmentConfig::from_env()).await?;
    let result = components
        .batch
        .enrich_batch(cli.batch_size, cli.tenant_id.as_deref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result)
}
