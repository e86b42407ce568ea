//! Collaborator traits for the enrichment pipeline.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability. Stores and queues
//! are backed by Postgres in production; tests substitute in-memory
//! implementations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// PRIMARY STORE
// =============================================================================

/// Persistence collaborator for activities.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Fetch up to `batch_size` unenriched activities
    /// (`signal_metadata IS NULL OR = '{}'`), most recent first.
    ///
    /// The descending-timestamp order is a deliberate recency bias carried
    /// over from the source system, not FIFO fairness; a sustained backlog
    /// of old activities can be starved under load.
    async fn fetch_unenriched(
        &self,
        batch_size: i64,
        tenant_id: Option<&str>,
    ) -> Result<Vec<Activity>>;

    /// Fetch a single activity for targeted retry processing. Returns
    /// `None` when the activity no longer exists.
    async fn fetch_by_id(&self, activity_id: Uuid) -> Result<Option<Activity>>;

    /// Record the resolved member on an activity.
    async fn update_member(&self, activity_id: Uuid, member_id: Uuid) -> Result<()>;

    /// Merge enrichment metadata into an activity's `signal_metadata`.
    /// Merge-based: present sub-objects are overwritten, absent ones kept.
    async fn update_signal_metadata(
        &self,
        activity_id: Uuid,
        metadata: &SignalMetadata,
    ) -> Result<()>;

    /// All tenant ids that have at least one activity.
    async fn distinct_tenants(&self) -> Result<Vec<String>>;

    /// Backlog metrics for workflow reporting.
    async fn batch_metrics(&self, tenant_id: Option<&str>) -> Result<BatchMetrics>;
}

/// Store for canonical members.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Create a new member, returning its id.
    async fn create_member(&self, member: NewMember) -> Result<Uuid>;

    /// Similarity search across display names, identity usernames, and
    /// emails. Returns matches at or above `threshold`, best first.
    async fn find_by_fuzzy_match(
        &self,
        term: &str,
        tenant_id: &str,
        threshold: f32,
    ) -> Result<Vec<FuzzyMatch>>;
}

/// Store for platform identity bindings.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_platform_and_source_id(
        &self,
        platform: &str,
        source_id: &str,
        tenant_id: &str,
    ) -> Result<Option<MemberIdentity>>;

    async fn find_by_platform_and_username(
        &self,
        platform: &str,
        username: &str,
        tenant_id: &str,
    ) -> Result<Option<MemberIdentity>>;

    async fn create_identity(&self, identity: NewIdentity) -> Result<()>;
}

// =============================================================================
// RETRY / DEAD-LETTER QUEUES
// =============================================================================

/// A retry message claimed by a consumer. The receipt must be acked within
/// the visibility timeout or the message becomes claimable again.
#[derive(Debug, Clone)]
pub struct ClaimedRetryMessage {
    pub receipt: Uuid,
    pub message: RetryMessage,
}

/// Durable at-least-once retry queue with delayed delivery.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Enqueue a message, visible after `delay_ms`.
    async fn enqueue(&self, message: &RetryMessage, delay_ms: u64) -> Result<()>;

    /// Claim up to `max_messages` visible messages.
    async fn receive(&self, max_messages: i64) -> Result<Vec<ClaimedRetryMessage>>;

    /// Acknowledge a claimed message, removing it from the queue.
    async fn ack(&self, receipt: Uuid) -> Result<()>;

    /// Number of messages currently enqueued (visible or in flight).
    async fn depth(&self) -> Result<i64>;
}

/// Terminal queue for messages that exhausted all retry attempts.
/// Append-only from the pipeline's point of view; drained by operators.
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn publish(&self, message: &DeadLetterMessage) -> Result<()>;

    async fn depth(&self) -> Result<i64>;
}

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Per-tenant signal index. One document per activity; `activity_id` is the
/// document key (upsert semantics).
#[async_trait]
pub trait SignalIndex: Send + Sync {
    /// Create the tenant's index if it does not exist.
    async fn ensure_index(&self, tenant_id: &str) -> Result<()>;

    async fn index_exists(&self, tenant_id: &str) -> Result<bool>;

    /// Upsert a single document.
    async fn index_signal(&self, tenant_id: &str, document: &SignalDocument) -> Result<()>;

    /// Upsert documents in one transaction. Any per-document failure fails
    /// the whole call.
    async fn bulk_index(&self, tenant_id: &str, documents: &[SignalDocument]) -> Result<()>;

    /// Scroll every indexed signal's id and embedding for clustering.
    async fn fetch_all_embeddings(&self, tenant_id: &str) -> Result<Vec<SignalEmbedding>>;

    /// Bulk-update cluster ids on indexed documents.
    async fn update_cluster_assignments(
        &self,
        tenant_id: &str,
        assignments: &[ClusterAssignment],
    ) -> Result<()>;

    async fn delete_signal(&self, tenant_id: &str, activity_id: Uuid) -> Result<()>;

    async fn document_count(&self, tenant_id: &str) -> Result<i64>;
}

// =============================================================================
// ENRICHMENT STEP PROVIDERS
// =============================================================================

/// Deduplication verdict for one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupVerdict {
    pub is_duplicate: bool,
    /// When duplicate, the activity this one duplicates.
    pub canonical_id: Option<Uuid>,
    /// Content signature the verdict was derived from.
    pub signature: String,
}

/// Produces quantized embeddings for activity text.
///
/// A provider without a real model backend returns [`StepValue::Pending`];
/// the pipeline records a pending sub-object and the activity stays
/// un-indexed until a later pass completes it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, activity: &Activity) -> Result<StepValue<Vec<f32>>>;
}

/// Detects near-duplicate content among enriched activities.
#[async_trait]
pub trait DeduplicationProvider: Send + Sync {
    async fn check(&self, activity: &Activity) -> Result<StepValue<DedupVerdict>>;
}

/// Produces product-area/sentiment/urgency/intent labels with confidence.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(&self, activity: &Activity) -> Result<StepValue<Classification>>;
}

/// Computes signal scores from an activity and its classification.
#[async_trait]
pub trait ScoringProvider: Send + Sync {
    async fn score(
        &self,
        activity: &Activity,
        classification: Option<&Classification>,
    ) -> Result<StepValue<SignalScores>>;
}
