//! Domain models for the sigmesh enrichment pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Reason string recorded on every dead-letter message.
pub const DEAD_LETTER_REASON_MAX_RETRIES: &str = "max_retries_exceeded";

/// Metadata version stamped into `signal_metadata` on first enrichment.
pub const ENRICHMENT_VERSION: &str = "1.0";

// =============================================================================
// ACTIVITY
// =============================================================================

/// A single platform event (issue, comment, post) ingested for enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    /// Platform-specific event type ("issue", "comment", ...).
    pub activity_type: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    /// Platform-native identifier of the acting user.
    pub source_id: String,
    pub member_id: Option<Uuid>,
    pub tenant_id: String,
    /// Raw platform attributes (author blocks, urls, labels).
    pub attributes: JsonValue,
    pub body: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Null/empty until enriched; sub-objects are merged in per step,
    /// never removed.
    pub signal_metadata: Option<SignalMetadata>,
}

impl Activity {
    /// Title and body joined for indexing and embedding input.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(title.as_str());
        }
        if let Some(body) = &self.body {
            parts.push(body.as_str());
        }
        parts.join(" ").trim().to_string()
    }
}

// =============================================================================
// SIGNAL METADATA
// =============================================================================

/// Completion state of an enrichment sub-object.
///
/// `Pending` is a first-class state: a provider that is not yet backed by a
/// real model reports it explicitly, and the indexing gate treats any
/// pending sub-object as "not fully enriched".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Complete,
}

/// Value produced by a pluggable enrichment step provider.
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue<T> {
    /// The provider has no real backend yet; record a pending sub-object.
    Pending,
    /// A real result.
    Ready(T),
}

/// Identity-resolution sub-object of `signal_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityResolutionMeta {
    pub resolved_member_id: Uuid,
    pub is_new_member: bool,
    pub is_new_identity: bool,
}

/// Embedding sub-object of `signal_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingMeta {
    pub status: StepStatus,
    /// Quantized vector (dimension `defaults::EMBED_DIMENSION`).
    pub quantized_vector: Option<Vec<f32>>,
}

/// Deduplication sub-object of `signal_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicationMeta {
    pub status: StepStatus,
    pub is_duplicate: bool,
    /// When duplicate, the activity this one duplicates.
    pub canonical_id: Option<Uuid>,
    /// Content signature used for duplicate detection.
    pub signature: Option<String>,
}

/// Sentiment label produced by the classification oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
    Unknown,
}

/// Urgency label produced by the classification oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

/// Labels and confidence produced by the classification oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub product_area: Vec<String>,
    pub sentiment: Sentiment,
    pub urgency: Urgency,
    pub intent: Vec<String>,
    /// Oracle confidence in [0, 1].
    pub confidence: f32,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            product_area: Vec::new(),
            sentiment: Sentiment::Unknown,
            urgency: Urgency::Unknown,
            intent: Vec::new(),
            confidence: 0.0,
        }
    }
}

/// Classification sub-object of `signal_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMeta {
    pub status: StepStatus,
    #[serde(flatten)]
    pub classification: Classification,
}

/// Signal score components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalScores {
    pub velocity: f32,
    pub cross_platform: f32,
    pub actionability: f32,
    pub novelty: f32,
}

/// Scoring sub-object of `signal_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoresMeta {
    pub status: StepStatus,
    #[serde(flatten)]
    pub scores: SignalScores,
}

/// Enrichment metadata accumulated on an activity, persisted as jsonb.
///
/// Once a step completes its sub-object is merged in and never removed.
/// Database writes use jsonb merge semantics, so re-running enrichment is
/// additive, not destructive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_resolution: Option<IdentityResolutionMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduplication: Option<DeduplicationMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoresMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustered_at: Option<DateTime<Utc>>,
}

impl SignalMetadata {
    /// Whether every indexing-relevant sub-object is present and none
    /// reports a pending status. Partially enriched activities are skipped
    /// by the indexer until a later pass completes them.
    pub fn is_fully_enriched(&self) -> bool {
        let embedding_done = self
            .embedding
            .as_ref()
            .is_some_and(|e| e.status != StepStatus::Pending && e.quantized_vector.is_some());
        let classification_done = self
            .classification
            .as_ref()
            .is_some_and(|c| c.status != StepStatus::Pending);
        let scores_done = self
            .scores
            .as_ref()
            .is_some_and(|s| s.status != StepStatus::Pending);
        let dedup_done = self
            .deduplication
            .as_ref()
            .is_some_and(|d| d.status != StepStatus::Pending);

        embedding_done && classification_done && scores_done && dedup_done
    }
}

// =============================================================================
// MEMBERS AND IDENTITIES
// =============================================================================

/// Canonical actor a platform identity resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub display_name: String,
    pub emails: Vec<String>,
    pub attributes: JsonValue,
    pub tenant_id: String,
}

/// Fields for creating a new member during identity resolution.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub display_name: String,
    pub emails: Vec<String>,
    pub attributes: JsonValue,
    pub tenant_id: String,
}

/// Binding of a `(platform, username|source_id, tenant)` tuple to a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub member_id: Uuid,
    pub platform: String,
    pub username: String,
    pub source_id: String,
    pub tenant_id: String,
}

/// Fields for creating a new member identity row.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub member_id: Uuid,
    pub platform: String,
    pub username: String,
    pub source_id: String,
    pub tenant_id: String,
}

/// A fuzzy-match candidate ordered by descending similarity.
#[derive(Debug, Clone)]
pub struct FuzzyMatch {
    pub member_id: Uuid,
    pub similarity: f32,
}

/// Outcome of resolving an activity's actor to a canonical member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityResolution {
    pub member_id: Uuid,
    pub is_new_member: bool,
    pub is_new_identity: bool,
}

// =============================================================================
// ENRICHMENT ACCOUNTING
// =============================================================================

/// Per-batch counters returned to the workflow caller. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub processed: u64,
    pub enriched: u64,
    pub failed: u64,
    pub partial_failures: u64,
    pub identities_resolved: u64,
    pub new_members: u64,
    pub new_identities: u64,
    pub embeddings_generated: u64,
    pub duplicates_detected: u64,
    pub classified: u64,
    pub scored: u64,
    pub indexed: u64,
    pub indexing_failed: u64,
}

/// The fixed, ordered stages of the per-activity pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    IdentityResolution,
    EmbeddingGeneration,
    Deduplication,
    Classification,
    Scoring,
    Indexing,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::IdentityResolution => "identity_resolution",
            StepName::EmbeddingGeneration => "embedding_generation",
            StepName::Deduplication => "deduplication",
            StepName::Classification => "classification",
            StepName::Scoring => "scoring",
            StepName::Indexing => "indexing",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one pipeline stage for one activity.
///
/// The step list determines whether an activity counts as enriched (all
/// success) or a partial failure (some failed, none unrecoverable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentStep {
    pub name: StepName,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl EnrichmentStep {
    pub fn success(name: StepName, duration_ms: u64) -> Self {
        Self {
            name,
            success: true,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(name: StepName, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name,
            success: false,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Backlog metrics reported alongside each workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub unenriched_count: i64,
    pub total_activities: i64,
    pub oldest_unenriched: Option<DateTime<Utc>>,
}

// =============================================================================
// RETRY / DEAD-LETTER MESSAGES
// =============================================================================

/// Queued request to re-run enrichment for a single activity.
///
/// `attempt` strictly increases across a failure lineage; a message at
/// `attempt >= max_retries` is terminal and transitions to a
/// [`DeadLetterMessage`] instead of being re-enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryMessage {
    pub correlation_id: Uuid,
    pub activity_id: Uuid,
    pub tenant_id: Option<String>,
    pub attempt: i32,
    pub max_retries: i32,
    pub original_error: String,
    pub enqueued_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Terminal record of an activity that exhausted all retry attempts.
/// Written once, never re-processed automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    pub correlation_id: Uuid,
    pub activity_id: Uuid,
    pub tenant_id: Option<String>,
    pub original_error: String,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
}

// =============================================================================
// SEARCH INDEX DOCUMENTS
// =============================================================================

/// Enriched, indexed representation of an activity. One document per
/// activity per tenant index; `activity_id` is the upsert key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDocument {
    pub activity_id: Uuid,
    pub tenant_id: String,
    pub platform: String,
    pub activity_type: String,
    pub timestamp: DateTime<Utc>,
    pub member_id: Option<Uuid>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub classification: Classification,
    pub scores: SignalScores,
    pub cluster_id: Option<i32>,
    pub is_duplicate: bool,
    pub canonical_id: Option<Uuid>,
}

// =============================================================================
// CLUSTERING
// =============================================================================

/// Clustering input: an indexed signal's id and embedding.
#[derive(Debug, Clone)]
pub struct SignalEmbedding {
    pub id: Uuid,
    pub embedding: Vec<f32>,
}

/// A signal's cluster membership after a clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub activity_id: Uuid,
    pub cluster_id: i32,
}

/// Size and centroid of one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStats {
    pub cluster_id: i32,
    pub size: usize,
    /// Mean vector of the cluster's member embeddings.
    pub centroid: Vec<f32>,
}

/// Full output of one clustering run. Cluster ids are recomputed from
/// scratch on every run and are not stable identifiers across runs.
#[derive(Debug, Clone, Default)]
pub struct ClusteringOutcome {
    pub assignments: Vec<ClusterAssignment>,
    pub cluster_stats: Vec<ClusterStats>,
    pub outliers: Vec<Uuid>,
}

/// Per-tenant summary of a clustering orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringRunReport {
    pub tenant_id: String,
    pub signals_processed: usize,
    pub clusters_created: usize,
    pub outliers: usize,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// WORKFLOWS
// =============================================================================

/// Workflow kinds exposed through the manual trigger surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Enrichment,
    Clustering,
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowType::Enrichment => write!(f, "enrichment"),
            WorkflowType::Clustering => write!(f, "clustering"),
        }
    }
}

/// Lifecycle state of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// Status record returned by workflow lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_type: WorkflowType,
    pub status: WorkflowStatus,
    pub start_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
}
