//! Manually run a workflow once.
//!
//! Executes an enrichment or clustering workflow through the same
//! timeout/retry path the scheduler uses, waits for it to finish, and
//! prints the execution record as JSON. Exits non-zero unless the
//! workflow completed.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::error;
use uuid::Uuid;

use sigmesh_core::{EnrichmentConfig, WorkflowStatus, WorkflowType};
use sigmesh_worker::{bootstrap, WorkflowScheduler};

#[derive(Clone, Copy, ValueEnum)]
enum Workflow {
    Enrichment,
    Clustering,
}

impl From<Workflow> for WorkflowType {
    fn from(w: Workflow) -> Self {
        match w {
            Workflow::Enrichment => WorkflowType::Enrichment,
            Workflow::Clustering => WorkflowType::Clustering,
        }
    }
}

#[derive(Parser)]
#[command(name = "sigmesh-trigger-workflow")]
#[command(author, version, about = "Run a workflow once and wait for it")]
struct Cli {
    /// Workflow to run
    #[arg(short, long, value_enum)]
    workflow_type: Workflow,

    /// Override the activities fetched per batch (enrichment only)
    #[arg(short, long)]
    batch_size: Option<i64>,

    /// Restrict the workflow to one tenant
    #[arg(short, long)]
    tenant_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    bootstrap::init_tracing();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(WorkflowStatus::Completed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Workflow trigger failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> sigmesh_core::Result<WorkflowStatus> {
    let components = bootstrap::build(EnrichmentConfig::from_env()).await?;

    let scheduler = WorkflowScheduler::new(
        components.batch.clone(),
        components.clustering.clone(),
        &components.config.batch,
        components.config.scheduler.clone(),
    );

    let workflow_id = Uuid::new_v4();
    let status = scheduler
        .execute_workflow(
            workflow_id,
            cli.workflow_type.into(),
            cli.batch_size,
            cli.tenant_id.as_deref(),
        )
        .await;

    if let Some(execution) = scheduler.execution(workflow_id).await {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    }
    Ok(status)
}
