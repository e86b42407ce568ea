//! Batch enrichment coordination.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use sigmesh_core::{
    ActivityStore, BatchConfig, BatchMetrics, EnrichmentResult, Error, Result,
};

use crate::pipeline::{EnrichmentPipeline, EnrichmentReport};
use crate::retry::RetryCoordinator;

/// Fetches unenriched activities and runs each through the pipeline,
/// accumulating per-batch counters. Per-activity failures never abort the
/// batch: hard failures go to the retry path, step failures are counted as
/// partial.
pub struct BatchCoordinator {
    activities: Arc<dyn ActivityStore>,
    pipeline: Arc<EnrichmentPipeline>,
    retry: Arc<RetryCoordinator>,
    config: BatchConfig,
}

impl BatchCoordinator {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        pipeline: Arc<EnrichmentPipeline>,
        retry: Arc<RetryCoordinator>,
        config: BatchConfig,
    ) -> Self {
        Self {
            activities,
            pipeline,
            retry,
            config,
        }
    }

    /// Enrich one batch of unenriched activities.
    ///
    /// `batch_size` overrides the configured size; `tenant_id` scopes the
    /// fetch to one tenant. The fetch predicate only selects activities
    /// with null or empty `signal_metadata`, so re-runs are idempotent:
    /// an already-enriched activity is never selected again.
    pub async fn enrich_batch(
        &self,
        batch_size: Option<i64>,
        tenant_id: Option<&str>,
    ) -> Result<EnrichmentResult> {
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        let started = Instant::now();

        let activities = self
            .activities
            .fetch_unenriched(batch_size, tenant_id)
            .await?;

        info!(
            subsystem = "enrich",
            op = "enrich_batch",
            batch_size,
            fetched = activities.len(),
            tenant_id,
            "Starting enrichment batch"
        );

        let mut result = EnrichmentResult::default();
        for activity in &activities {
            result.processed += 1;

            match self.pipeline.enrich_activity(activity).await {
                Ok(report) => {
                    self.tally(&mut result, &report);
                    // A transient indexing failure would otherwise strand the
                    // activity: its metadata is already persisted, so the
                    // fetch predicate never selects it again. Only the retry
                    // queue can still reach it.
                    if let Some(index_error) = &report.retryable_index_error {
                        warn!(
                            subsystem = "enrich",
                            op = "enrich_batch",
                            activity_id = %activity.id,
                            error = index_error,
                            "Transient indexing failure, routing to retry"
                        );
                        if let Err(enqueue_err) = self
                            .retry
                            .enqueue_for_retry(
                                activity.id,
                                Some(activity.tenant_id.clone()),
                                0,
                                index_error,
                                None,
                            )
                            .await
                        {
                            error!(
                                subsystem = "enrich",
                                op = "enrich_batch",
                                activity_id = %activity.id,
                                error = %enqueue_err,
                                "Failed to enqueue retry"
                            );
                        }
                    }
                }
                Err(e) => {
                    result.failed += 1;
                    warn!(
                        subsystem = "enrich",
                        op = "enrich_batch",
                        activity_id = %activity.id,
                        error = %e,
                        "Activity enrichment failed, routing to retry"
                    );
                    // A retry-enqueue failure is logged, never fatal to the
                    // batch: the activity stays unenriched and the next
                    // scheduled run picks it up again.
                    if let Err(enqueue_err) = self
                        .retry
                        .enqueue_for_retry(
                            activity.id,
                            Some(activity.tenant_id.clone()),
                            0,
                            &e.to_string(),
                            None,
                        )
                        .await
                    {
                        error!(
                            subsystem = "enrich",
                            op = "enrich_batch",
                            activity_id = %activity.id,
                            error = %enqueue_err,
                            "Failed to enqueue retry"
                        );
                    }
                }
            }
        }

        info!(
            subsystem = "enrich",
            op = "enrich_batch",
            processed = result.processed,
            enriched = result.enriched,
            partial_failures = result.partial_failures,
            failed = result.failed,
            indexed = result.indexed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Enrichment batch complete"
        );
        Ok(result)
    }

    /// Enrich a single activity by id; the targeted path used by retry
    /// processing.
    pub async fn enrich_one(&self, activity_id: Uuid) -> Result<EnrichmentReport> {
        let activity = self
            .activities
            .fetch_by_id(activity_id)
            .await?
            .ok_or(Error::ActivityNotFound(activity_id))?;
        self.pipeline.enrich_activity(&activity).await
    }

    /// Backlog metrics for workflow reporting.
    pub async fn batch_metrics(&self, tenant_id: Option<&str>) -> Result<BatchMetrics> {
        self.activities.batch_metrics(tenant_id).await
    }

    fn tally(&self, result: &mut EnrichmentResult, report: &EnrichmentReport) {
        if report.clean() {
            result.enriched += 1;
        } else {
            result.partial_failures += 1;
        }

        result.identities_resolved += 1;
        if report.resolution.is_new_member {
            result.new_members += 1;
        }
        if report.resolution.is_new_identity {
            result.new_identities += 1;
        }
        if report.embedding_generated {
            result.embeddings_generated += 1;
        }
        if report.duplicate_detected {
            result.duplicates_detected += 1;
        }
        if report.classified {
            result.classified += 1;
        }
        if report.scored {
            result.scored += 1;
        }
        if report.indexed {
            result.indexed += 1;
        }
        if report.indexing_failed {
            result.indexing_failed += 1;
        }
    }
}
