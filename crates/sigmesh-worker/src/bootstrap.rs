//! Shared component assembly for the worker binaries.

use std::sync::Arc;

use tracing::info;

use sigmesh_cluster::ClusteringOrchestrator;
use sigmesh_core::{EnrichmentConfig, Error, Result};
use sigmesh_db::Database;
use sigmesh_enrich::{
    BatchCoordinator, EnrichmentPipeline, HashEmbeddingProvider, HeuristicScoringProvider,
    IdentityResolver, KeywordClassificationOracle, RetryCoordinator,
    SignatureDeduplicationProvider,
};
use sigmesh_search::{PgSignalIndex, SignalIndexer};

/// Fully wired enrichment system, shared by every binary.
pub struct Components {
    pub database: Database,
    pub config: EnrichmentConfig,
    pub batch: Arc<BatchCoordinator>,
    pub retry: Arc<RetryCoordinator>,
    pub clustering: Arc<ClusteringOrchestrator>,
}

/// Read `DATABASE_URL` from the environment.
pub fn database_url() -> Result<String> {
    std::env::var("DATABASE_URL")
        .map_err(|_| Error::Config("DATABASE_URL environment variable is not set".into()))
}

/// Connect to Postgres and wire every collaborator with the default step
/// providers.
pub async fn build(config: EnrichmentConfig) -> Result<Components> {
    let url = database_url()?;
    let database = Database::connect(&url).await?;
    info!("Connected to database");

    let index: Arc<PgSignalIndex> = Arc::new(PgSignalIndex::with_config(
        database.pool.clone(),
        config.index.clone(),
    ));

    let resolver = IdentityResolver::new(
        database.members.clone(),
        database.identities.clone(),
        config.identity.clone(),
    );
    let pipeline = Arc::new(EnrichmentPipeline::new(
        database.activities.clone(),
        resolver,
        Arc::new(HashEmbeddingProvider::new(config.index.embedding_dimension)),
        Arc::new(SignatureDeduplicationProvider::default()),
        Arc::new(KeywordClassificationOracle::default()),
        Arc::new(HeuristicScoringProvider::default()),
        SignalIndexer::new(index.clone()),
    ));

    let retry = Arc::new(RetryCoordinator::new(
        database.retry_queue.clone(),
        database.dead_letter.clone(),
        config.retry.clone(),
    ));
    let batch = Arc::new(BatchCoordinator::new(
        database.activities.clone(),
        pipeline,
        retry.clone(),
        config.batch.clone(),
    ));
    let clustering = Arc::new(ClusteringOrchestrator::new(
        database.activities.clone(),
        index,
        config.clustering.clone(),
    ));

    Ok(Components {
        database,
        config,
        batch,
        retry,
        clustering,
    })
}

/// Initialize tracing for a binary: `RUST_LOG` controls the filter, `info`
/// is the default level.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}
