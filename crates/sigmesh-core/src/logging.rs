//! Structured logging field name constants for sigmesh.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, batch/workflow completions |
//! | DEBUG | Decision points, intermediate values |
//! | TRACE | Per-item iteration (per-activity step detail) |

/// Correlation ID propagated across a retry lineage. Format: UUIDv4.
pub const CORRELATION_ID: &str = "correlation_id";

/// Subsystem originating the log event.
/// Values: "enrich", "cluster", "search", "db", "worker"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "enrich_batch", "resolve_identity", "bulk_index"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Activity UUID being enriched.
pub const ACTIVITY_ID: &str = "activity_id";

/// Tenant id scoping the operation.
pub const TENANT_ID: &str = "tenant_id";

/// Member UUID resolved for an activity.
pub const MEMBER_ID: &str = "member_id";

/// Workflow execution UUID.
pub const WORKFLOW_ID: &str = "workflow_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Retry attempt number within a lineage.
pub const ATTEMPT: &str = "attempt";

/// Number of activities fetched for a batch.
pub const BATCH_SIZE: &str = "batch_size";

/// Number of clusters produced by a clustering run.
pub const CLUSTER_COUNT: &str = "cluster_count";

/// Number of outliers produced by a clustering run.
pub const OUTLIER_COUNT: &str = "outlier_count";

/// Number of documents in a bulk index call.
pub const DOCUMENT_COUNT: &str = "document_count";
