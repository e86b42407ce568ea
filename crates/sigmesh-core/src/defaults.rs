//! Centralized default constants for the sigmesh enrichment pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// BATCH PROCESSING
// =============================================================================

/// Default number of unenriched activities fetched per batch.
pub const BATCH_SIZE: i64 = 1000;

/// Default enrichment workflow interval in seconds (15 minutes).
pub const ENRICHMENT_INTERVAL_SECS: u64 = 900;

// =============================================================================
// IDENTITY RESOLUTION
// =============================================================================

/// Default similarity threshold for fuzzy identity matching.
pub const FUZZY_MATCH_THRESHOLD: f32 = 0.85;

/// Whether fuzzy matching is enabled by default.
pub const FUZZY_MATCH_ENABLED: bool = true;

// =============================================================================
// RETRY / DEAD-LETTER
// =============================================================================

/// Maximum enrichment retry attempts before dead-lettering.
pub const RETRY_MAX_ATTEMPTS: i32 = 3;

/// Initial retry backoff delay in milliseconds.
pub const RETRY_INITIAL_DELAY_MS: u64 = 1000;

/// Exponential backoff multiplier between attempts.
pub const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Backoff ceiling in milliseconds (5 minutes).
pub const RETRY_MAX_DELAY_MS: u64 = 300_000;

/// Maximum uniform jitter added to backoff delays, as a fraction of the
/// computed delay. Spreads simultaneous retries to avoid thundering herds.
pub const RETRY_JITTER_FRACTION: f64 = 0.1;

/// Queue visibility timeout in seconds. A claimed message that is neither
/// acked nor dead-lettered within this window becomes claimable again.
pub const QUEUE_VISIBILITY_TIMEOUT_SECS: i64 = 300;

/// Queue message retention in days.
pub const QUEUE_RETENTION_DAYS: i64 = 14;

/// Default retry-queue consumer poll interval in milliseconds.
pub const RETRY_POLL_INTERVAL_MS: u64 = 20_000;

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Prefix for per-tenant signal index names.
pub const INDEX_PREFIX: &str = "signals";

/// Quantized embedding dimension stored in signal documents.
pub const EMBED_DIMENSION: usize = 96;

/// HNSW graph degree (m) for the embedding index.
pub const HNSW_M: i32 = 16;

/// HNSW construction beam width (ef_construction).
pub const HNSW_EF_CONSTRUCTION: i32 = 100;

/// Page size for scrolling all signals out of an index.
pub const INDEX_SCROLL_PAGE_SIZE: i64 = 500;

// =============================================================================
// CLUSTERING
// =============================================================================

/// Minimum signals per cluster. Sets below this size are all outliers,
/// avoiding degenerate single-cluster results on tiny batches.
pub const MIN_CLUSTER_SIZE: usize = 5;

/// Sentinel cluster id assigned to outliers.
pub const OUTLIER_CLUSTER_ID: i32 = -1;

/// Cosine similarity threshold for density-reachability during clustering.
pub const CLUSTER_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Batch size for writing cluster assignments back to the stores.
pub const CLUSTER_WRITE_BATCH: usize = 100;

// =============================================================================
// WORKFLOW SCHEDULING
// =============================================================================

/// Workflow-level timeout in seconds (10 minutes).
pub const WORKFLOW_TIMEOUT_SECS: u64 = 600;

/// Wall-clock threshold after which a run emits an SLO warning (5 minutes).
pub const WORKFLOW_SLO_WARN_SECS: u64 = 300;

/// Maximum attempts per workflow step.
pub const WORKFLOW_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Initial workflow step retry interval in milliseconds.
pub const WORKFLOW_RETRY_INITIAL_MS: u64 = 1000;

/// Workflow step retry interval ceiling in milliseconds.
pub const WORKFLOW_RETRY_MAX_MS: u64 = 30_000;

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Maximum connections in the shared primary-store pool. Identity
/// resolution, activity reads/writes, and clustering writes all share this
/// bounded pool.
pub const DB_MAX_CONNECTIONS: u32 = 5;

/// Connection timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_ordered() {
        const {
            assert!(RETRY_INITIAL_DELAY_MS < RETRY_MAX_DELAY_MS);
            assert!(WORKFLOW_RETRY_INITIAL_MS < WORKFLOW_RETRY_MAX_MS);
        }
    }

    #[test]
    fn jitter_fraction_is_bounded() {
        assert!(RETRY_JITTER_FRACTION > 0.0);
        assert!(RETRY_JITTER_FRACTION < 1.0);
    }

    #[test]
    fn slo_threshold_below_workflow_timeout() {
        const {
            assert!(WORKFLOW_SLO_WARN_SECS < WORKFLOW_TIMEOUT_SECS);
        }
    }

    #[test]
    fn cluster_write_batch_is_positive() {
        const {
            assert!(CLUSTER_WRITE_BATCH > 0);
            assert!(MIN_CLUSTER_SIZE > 1);
        }
    }

    #[test]
    fn similarity_thresholds_in_unit_interval() {
        assert!(FUZZY_MATCH_THRESHOLD > 0.0 && FUZZY_MATCH_THRESHOLD <= 1.0);
        assert!(CLUSTER_SIMILARITY_THRESHOLD > 0.0 && CLUSTER_SIMILARITY_THRESHOLD <= 1.0);
    }
}
