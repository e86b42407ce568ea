//! Configuration structs for the enrichment pipeline.
//!
//! Configuration is explicit: structs are built at startup and passed into
//! constructors. There is no global config singleton, so tests can run each
//! component with an alternate configuration.

use crate::defaults;

/// Identity resolution tuning.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Minimum similarity for a fuzzy match to be accepted.
    pub fuzzy_match_threshold: f32,
    pub enable_fuzzy_matching: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            fuzzy_match_threshold: defaults::FUZZY_MATCH_THRESHOLD,
            enable_fuzzy_matching: defaults::FUZZY_MATCH_ENABLED,
        }
    }
}

/// Batch fetch and scheduling parameters.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: i64,
    /// Seconds between scheduled enrichment runs.
    pub interval_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            interval_secs: defaults::ENRICHMENT_INTERVAL_SECS,
        }
    }
}

/// Retry backoff policy for the durable retry queue.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: i32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::RETRY_MAX_ATTEMPTS,
            initial_delay_ms: defaults::RETRY_INITIAL_DELAY_MS,
            backoff_multiplier: defaults::RETRY_BACKOFF_MULTIPLIER,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
        }
    }
}

/// Per-tenant signal index parameters.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Index name prefix; the full name is `{prefix}_{tenant}`.
    pub prefix: String,
    pub embedding_dimension: usize,
    pub hnsw_m: i32,
    pub hnsw_ef_construction: i32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            prefix: defaults::INDEX_PREFIX.to_string(),
            embedding_dimension: defaults::EMBED_DIMENSION,
            hnsw_m: defaults::HNSW_M,
            hnsw_ef_construction: defaults::HNSW_EF_CONSTRUCTION,
        }
    }
}

/// Clustering policy knobs.
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    pub min_cluster_size: usize,
    pub outlier_cluster_id: i32,
    /// Cosine similarity threshold for density reachability.
    pub similarity_threshold: f32,
    /// Batch size for writing assignments back to both stores.
    pub write_batch_size: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: defaults::MIN_CLUSTER_SIZE,
            outlier_cluster_id: defaults::OUTLIER_CLUSTER_ID,
            similarity_threshold: defaults::CLUSTER_SIMILARITY_THRESHOLD,
            write_batch_size: defaults::CLUSTER_WRITE_BATCH,
        }
    }
}

/// Workflow-level timeout and retry policy.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workflow_timeout_secs: u64,
    pub slo_warn_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workflow_timeout_secs: defaults::WORKFLOW_TIMEOUT_SECS,
            slo_warn_secs: defaults::WORKFLOW_SLO_WARN_SECS,
            retry_max_attempts: defaults::WORKFLOW_RETRY_MAX_ATTEMPTS,
            retry_initial_ms: defaults::WORKFLOW_RETRY_INITIAL_MS,
            retry_max_ms: defaults::WORKFLOW_RETRY_MAX_MS,
        }
    }
}

/// Top-level configuration for the enrichment system.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentConfig {
    pub identity: IdentityConfig,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    pub index: IndexConfig,
    pub clustering: ClusteringConfig,
    pub scheduler: SchedulerConfig,
}

impl EnrichmentConfig {
    /// Load configuration from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SIGMESH_BATCH_SIZE` | `1000` | Activities fetched per batch |
    /// | `SIGMESH_INTERVAL_SECS` | `900` | Seconds between scheduled runs |
    /// | `SIGMESH_MAX_RETRIES` | `3` | Retry attempts before dead-letter |
    /// | `SIGMESH_FUZZY_THRESHOLD` | `0.85` | Fuzzy identity match floor |
    /// | `SIGMESH_MIN_CLUSTER_SIZE` | `5` | Minimum signals per cluster |
    /// | `SIGMESH_INDEX_PREFIX` | `signals` | Per-tenant index prefix |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SIGMESH_BATCH_SIZE") {
            if let Ok(n) = val.parse::<i64>() {
                config.batch.batch_size = n.max(1);
            } else {
                tracing::warn!(value = %val, "Invalid SIGMESH_BATCH_SIZE, using default");
            }
        }

        if let Ok(val) = std::env::var("SIGMESH_INTERVAL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.batch.interval_secs = n.max(1);
            }
        }

        if let Ok(val) = std::env::var("SIGMESH_MAX_RETRIES") {
            if let Ok(n) = val.parse::<i32>() {
                config.retry.max_retries = n.max(0);
            }
        }

        if let Ok(val) = std::env::var("SIGMESH_FUZZY_THRESHOLD") {
            if let Ok(t) = val.parse::<f32>() {
                config.identity.fuzzy_match_threshold = t.clamp(0.0, 1.0);
            }
        }

        if let Ok(val) = std::env::var("SIGMESH_MIN_CLUSTER_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.clustering.min_cluster_size = n.max(2);
            }
        }

        if let Ok(val) = std::env::var("SIGMESH_INDEX_PREFIX") {
            if !val.is_empty() {
                config.index.prefix = val;
            }
        }

        config
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch.batch_size = batch_size;
        self
    }

    /// Set the maximum retry attempts.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Set the clustering policy.
    pub fn with_clustering(mut self, clustering: ClusteringConfig) -> Self {
        self.clustering = clustering;
        self
    }

    /// Enable or disable fuzzy identity matching.
    pub fn with_fuzzy_matching(mut self, enabled: bool) -> Self {
        self.identity.enable_fuzzy_matching = enabled;
        self
    }
}
