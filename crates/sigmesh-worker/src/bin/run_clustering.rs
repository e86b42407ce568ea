//! One-shot clustering run.
//!
//! Clusters one tenant's indexed signals, or every tenant's, and prints
//! the per-tenant reports as JSON. Exits non-zero when any tenant's run
//! failed.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use sigmesh_core::{ClusteringRunReport, EnrichmentConfig};
use sigmesh_worker::bootstrap;

#[derive(Parser)]
#[command(name = "sigmesh-run-clustering")]
#[command(author, version, about = "Cluster indexed signals")]
struct Cli {
    /// Cluster a single tenant
    #[arg(short, long, conflicts_with = "all_tenants")]
    tenant_id: Option<String>,

    /// Cluster every tenant with activities (default when no tenant given)
    #[arg(long)]
    all_tenants: bool,

    /// Override the minimum signals per cluster
    #[arg(long)]
    min_cluster_size: Option<usize>,

    /// Override the outlier sentinel cluster id
    #[arg(long)]
    outlier_cluster_id: Option<i32>,

    /// Print index stats for the tenant instead of clustering
    #[arg(long, requires = "tenant_id")]
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    bootstrap::init_tracing();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(reports) => {
            if reports.iter().all(|r| r.success) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %e, "Clustering run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> sigmesh_core::Result<Vec<ClusteringRunReport>> {
    let mut config = EnrichmentConfig::from_env();
    if let Some(min_cluster_size) = cli.min_cluster_size {
        config.clustering.min_cluster_size = min_cluster_size.max(2);
    }
    if let Some(outlier_cluster_id) = cli.outlier_cluster_id {
        config.clustering.outlier_cluster_id = outlier_cluster_id;
    }
    let components = bootstrap::build(config).await?;

    if cli.stats {
        // `requires` guarantees the tenant is present.
        if let Some(tenant) = cli.tenant_id.as_deref() {
            let stats = components.clustering.clustering_stats(tenant).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        return Ok(Vec::new());
    }

    let reports = match cli.tenant_id.as_deref() {
        Some(tenant) => vec![components.clustering.cluster_tenant(tenant).await?],
        None => components.clustering.cluster_all_tenants().await?,
    };
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(reports)
}
