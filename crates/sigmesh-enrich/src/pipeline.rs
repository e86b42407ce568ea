//! The per-activity enrichment pipeline.
//!
//! Six fixed, ordered steps: identity resolution, embedding generation,
//! deduplication, classification, scoring, indexing. Step outcomes are
//! tagged records, not control flow: a failing step is noted and the
//! pipeline moves on. The one exception is identity resolution: without a
//! member every later step is meaningless, so its failure aborts the
//! activity and surfaces to the retry path.
//!
//! Accumulated metadata is persisted in a single merge write after the
//! scoring step, before indexing; the indexer then gates on full
//! enrichment.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use uuid::Uuid;

use sigmesh_core::{
    models::ENRICHMENT_VERSION, Activity, ActivityStore, Classification, ClassificationMeta,
    ClassificationOracle, DeduplicationMeta, DeduplicationProvider, EmbeddingMeta,
    EmbeddingProvider, EnrichmentStep, IdentityResolution, IdentityResolutionMeta, Result,
    ScoresMeta, ScoringProvider, SignalMetadata, StepName, StepStatus, StepValue,
};
use sigmesh_search::SignalIndexer;

use crate::identity::IdentityResolver;

/// Outcome of running the pipeline on one activity.
#[derive(Debug)]
pub struct EnrichmentReport {
    pub activity_id: Uuid,
    pub resolution: IdentityResolution,
    /// Ordered step records; determines clean vs partial-failure runs.
    pub steps: Vec<EnrichmentStep>,
    pub embedding_generated: bool,
    pub duplicate_detected: bool,
    pub classified: bool,
    pub scored: bool,
    pub indexed: bool,
    pub indexing_failed: bool,
    /// Indexing failed with a transient error. The metadata merge already
    /// landed, so the batch fetch predicate will not pick this activity up
    /// again; the coordinator must route it to the retry queue.
    pub retryable_index_error: Option<String>,
}

impl EnrichmentReport {
    /// All steps succeeded.
    pub fn clean(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }
}

/// Runs the fixed enrichment step sequence for single activities.
pub struct EnrichmentPipeline {
    activities: Arc<dyn ActivityStore>,
    resolver: IdentityResolver,
    embedder: Arc<dyn EmbeddingProvider>,
    dedup: Arc<dyn DeduplicationProvider>,
    oracle: Arc<dyn ClassificationOracle>,
    scorer: Arc<dyn ScoringProvider>,
    indexer: SignalIndexer,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl EnrichmentPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        resolver: IdentityResolver,
        embedder: Arc<dyn EmbeddingProvider>,
        dedup: Arc<dyn DeduplicationProvider>,
        oracle: Arc<dyn ClassificationOracle>,
        scorer: Arc<dyn ScoringProvider>,
        indexer: SignalIndexer,
    ) -> Self {
        Self {
            activities,
            resolver,
            embedder,
            dedup,
            oracle,
            scorer,
            indexer,
        }
    }

    /// Run all six steps for one activity.
    ///
    /// Returns `Err` only when identity resolution (or its member write)
    /// fails; every other step failure is recorded in the report's step
    /// list and the pipeline continues.
    pub async fn enrich_activity(&self, activity: &Activity) -> Result<EnrichmentReport> {
        let mut steps = Vec::with_capacity(6);
        let mut metadata = SignalMetadata::default();

        // Step 1: identity resolution. The only hard failure.
        let start = Instant::now();
        let resolution = self.resolver.resolve(activity).await?;
        if activity.member_id != Some(resolution.member_id) {
            self.activities
                .update_member(activity.id, resolution.member_id)
                .await?;
        }
        metadata.identity_resolution = Some(IdentityResolutionMeta {
            resolved_member_id: resolution.member_id,
            is_new_member: resolution.is_new_member,
            is_new_identity: resolution.is_new_identity,
        });
        steps.push(EnrichmentStep::success(
            StepName::IdentityResolution,
            elapsed_ms(start),
        ));

        let mut enriched = activity.clone();
        enriched.member_id = Some(resolution.member_id);

        let mut report = EnrichmentReport {
            activity_id: activity.id,
            resolution,
            steps: Vec::new(),
            embedding_generated: false,
            duplicate_detected: false,
            classified: false,
            scored: false,
            indexed: false,
            indexing_failed: false,
            retryable_index_error: None,
        };

        // Step 2: embedding generation.
        let start = Instant::now();
        match self.embedder.embed(&enriched).await {
            Ok(StepValue::Ready(vector)) => {
                metadata.embedding = Some(EmbeddingMeta {
                    status: StepStatus::Complete,
                    quantized_vector: Some(vector),
                });
                report.embedding_generated = true;
                steps.push(EnrichmentStep::success(
                    StepName::EmbeddingGeneration,
                    elapsed_ms(start),
                ));
            }
            Ok(StepValue::Pending) => {
                metadata.embedding = Some(EmbeddingMeta {
                    status: StepStatus::Pending,
                    quantized_vector: None,
                });
                steps.push(EnrichmentStep::success(
                    StepName::EmbeddingGeneration,
                    elapsed_ms(start),
                ));
            }
            Err(e) => {
                steps.push(EnrichmentStep::failure(
                    StepName::EmbeddingGeneration,
                    e.to_string(),
                    elapsed_ms(start),
                ));
            }
        }

        // Step 3: deduplication.
        let start = Instant::now();
        match self.dedup.check(&enriched).await {
            Ok(StepValue::Ready(verdict)) => {
                report.duplicate_detected = verdict.is_duplicate;
                metadata.deduplication = Some(DeduplicationMeta {
                    status: StepStatus::Complete,
                    is_duplicate: verdict.is_duplicate,
                    canonical_id: verdict.canonical_id,
                    signature: Some(verdict.signature),
                });
                steps.push(EnrichmentStep::success(
                    StepName::Deduplication,
                    elapsed_ms(start),
                ));
            }
            Ok(StepValue::Pending) => {
                metadata.deduplication = Some(DeduplicationMeta {
                    status: StepStatus::Pending,
                    is_duplicate: false,
                    canonical_id: None,
                    signature: None,
                });
                steps.push(EnrichmentStep::success(
                    StepName::Deduplication,
                    elapsed_ms(start),
                ));
            }
            Err(e) => {
                steps.push(EnrichmentStep::failure(
                    StepName::Deduplication,
                    e.to_string(),
                    elapsed_ms(start),
                ));
            }
        }

        // Step 4: classification.
        let start = Instant::now();
        let mut classification: Option<Classification> = None;
        match self.oracle.classify(&enriched).await {
            Ok(StepValue::Ready(c)) => {
                report.classified = true;
                classification = Some(c.clone());
                metadata.classification = Some(ClassificationMeta {
                    status: StepStatus::Complete,
                    classification: c,
                });
                steps.push(EnrichmentStep::success(
                    StepName::Classification,
                    elapsed_ms(start),
                ));
            }
            Ok(StepValue::Pending) => {
                metadata.classification = Some(ClassificationMeta {
                    status: StepStatus::Pending,
                    classification: Classification::default(),
                });
                steps.push(EnrichmentStep::success(
                    StepName::Classification,
                    elapsed_ms(start),
                ));
            }
            Err(e) => {
                steps.push(EnrichmentStep::failure(
                    StepName::Classification,
                    e.to_string(),
                    elapsed_ms(start),
                ));
            }
        }

        // Step 5: scoring, fed the classification when it is available.
        let start = Instant::now();
        match self.scorer.score(&enriched, classification.as_ref()).await {
            Ok(StepValue::Ready(scores)) => {
                report.scored = true;
                metadata.scores = Some(ScoresMeta {
                    status: StepStatus::Complete,
                    scores,
                });
                steps.push(EnrichmentStep::success(StepName::Scoring, elapsed_ms(start)));
            }
            Ok(StepValue::Pending) => {
                metadata.scores = Some(ScoresMeta {
                    status: StepStatus::Pending,
                    scores: Default::default(),
                });
                steps.push(EnrichmentStep::success(StepName::Scoring, elapsed_ms(start)));
            }
            Err(e) => {
                steps.push(EnrichmentStep::failure(
                    StepName::Scoring,
                    e.to_string(),
                    elapsed_ms(start),
                ));
            }
        }

        metadata.enriched_at = Some(chrono::Utc::now());
        metadata.enrichment_version = Some(ENRICHMENT_VERSION.to_string());

        // Single merge write of everything accumulated so far.
        let start = Instant::now();
        if let Err(e) = self
            .activities
            .update_signal_metadata(activity.id, &metadata)
            .await
        {
            warn!(
                subsystem = "enrich",
                op = "enrich_activity",
                activity_id = %activity.id,
                error = %e,
                "Failed to persist signal metadata; skipping indexing"
            );
            report.indexing_failed = true;
            steps.push(EnrichmentStep::failure(
                StepName::Indexing,
                format!("metadata persist failed: {e}"),
                elapsed_ms(start),
            ));
            report.steps = steps;
            return Ok(report);
        }

        // Step 6: indexing, gated on full enrichment.
        enriched.signal_metadata = Some(metadata);
        let start = Instant::now();
        match self.indexer.index_activity(&enriched).await {
            Ok(indexed) => {
                report.indexed = indexed;
                steps.push(EnrichmentStep::success(StepName::Indexing, elapsed_ms(start)));
            }
            Err(e) => {
                report.indexing_failed = true;
                if e.is_retryable() {
                    report.retryable_index_error = Some(e.to_string());
                }
                steps.push(EnrichmentStep::failure(
                    StepName::Indexing,
                    e.to_string(),
                    elapsed_ms(start),
                ));
            }
        }

        report.steps = steps;
        debug!(
            subsystem = "enrich",
            op = "enrich_activity",
            activity_id = %activity.id,
            member_id = %report.resolution.member_id,
            clean = report.clean(),
            indexed = report.indexed,
            "Enriched activity"
        );
        Ok(report)
    }
}
