//! Retry coordination with exponential backoff and dead-lettering.
//!
//! Each failing activity owns a retry lineage identified by a correlation
//! id. The lineage's attempt counter travels through the durable queue,
//! not in-process recursion: a failed run re-enqueues with `attempt + 1`,
//! and a lineage at `attempt >= max_retries` transitions to the
//! dead-letter queue exactly once. Dead-letter is one-way.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use sigmesh_core::{
    defaults, models::DEAD_LETTER_REASON_MAX_RETRIES, DeadLetterMessage, DeadLetterQueue, Error,
    Result, RetryConfig, RetryMessage, RetryQueue,
};

use crate::batch::BatchCoordinator;

/// What became of a failed attempt handed to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-enqueued; carries the next attempt number and the applied delay.
    Requeued { attempt: i32, delay_ms: u64 },
    /// Lineage exhausted; published to the dead-letter queue.
    DeadLettered,
}

/// What became of a claimed retry message after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Enrichment ran; the activity is done (or partially done).
    Succeeded,
    /// Enrichment failed again; the lineage was re-enqueued.
    Requeued,
    /// Enrichment failed and the lineage was exhausted.
    DeadLettered,
    /// The activity no longer exists; the message is discarded.
    Dropped,
}

/// Drives the Enqueued → Processing → {Succeeded, Requeued, DeadLettered}
/// lineage state machine.
pub struct RetryCoordinator {
    queue: Arc<dyn RetryQueue>,
    dead_letter: Arc<dyn DeadLetterQueue>,
    config: RetryConfig,
}

impl RetryCoordinator {
    pub fn new(
        queue: Arc<dyn RetryQueue>,
        dead_letter: Arc<dyn DeadLetterQueue>,
        config: RetryConfig,
    ) -> Self {
        Self {
            queue,
            dead_letter,
            config,
        }
    }

    /// Exponential backoff for a given attempt, capped at the configured
    /// ceiling. Deterministic; jitter is added separately at enqueue time.
    pub fn backoff_delay_ms(&self, attempt: i32) -> u64 {
        let exp = self.config.backoff_multiplier.powi(attempt.max(0));
        let delay = self.config.initial_delay_ms as f64 * exp;
        delay.min(self.config.max_delay_ms as f64) as u64
    }

    fn jittered(&self, delay_ms: u64) -> u64 {
        let jitter_max = (delay_ms as f64 * defaults::RETRY_JITTER_FRACTION) as u64;
        if jitter_max == 0 {
            return delay_ms;
        }
        delay_ms + rand::thread_rng().gen_range(0..=jitter_max)
    }

    /// Record a failed attempt for an activity.
    ///
    /// `attempt` is the attempt that just failed (0 for the initial batch
    /// run). At or beyond `max_retries` the lineage dead-letters; otherwise
    /// a message with `attempt + 1` is enqueued with backoff delay.
    pub async fn enqueue_for_retry(
        &self,
        activity_id: Uuid,
        tenant_id: Option<String>,
        attempt: i32,
        original_error: &str,
        correlation_id: Option<Uuid>,
    ) -> Result<RetryOutcome> {
        let correlation_id = correlation_id.unwrap_or_else(Uuid::new_v4);

        if attempt >= self.config.max_retries {
            self.dead_letter
                .publish(&DeadLetterMessage {
                    correlation_id,
                    activity_id,
                    tenant_id,
                    original_error: original_error.to_string(),
                    failed_at: Utc::now(),
                    reason: DEAD_LETTER_REASON_MAX_RETRIES.to_string(),
                })
                .await?;
            info!(
                subsystem = "enrich",
                op = "enqueue_for_retry",
                correlation_id = %correlation_id,
                activity_id = %activity_id,
                attempt,
                "Retry lineage exhausted, dead-lettered"
            );
            return Ok(RetryOutcome::DeadLettered);
        }

        let delay_ms = self.jittered(self.backoff_delay_ms(attempt));
        let now = Utc::now();
        let message = RetryMessage {
            correlation_id,
            activity_id,
            tenant_id,
            attempt: attempt + 1,
            max_retries: self.config.max_retries,
            original_error: original_error.to_string(),
            enqueued_at: now,
            last_attempt_at: (attempt > 0).then_some(now),
        };
        self.queue.enqueue(&message, delay_ms).await?;

        info!(
            subsystem = "enrich",
            op = "enqueue_for_retry",
            correlation_id = %correlation_id,
            activity_id = %activity_id,
            attempt = message.attempt,
            delay_ms,
            "Enqueued enrichment retry"
        );
        Ok(RetryOutcome::Requeued {
            attempt: message.attempt,
            delay_ms,
        })
    }

    /// Process one claimed retry message: re-run enrichment for the single
    /// activity and advance the lineage on failure.
    pub async fn process_retry_message(
        &self,
        message: &RetryMessage,
        batch: &BatchCoordinator,
    ) -> Result<RetryDisposition> {
        match batch.enrich_one(message.activity_id).await {
            Ok(report) => {
                if report.retryable_index_error.is_some() {
                    warn!(
                        subsystem = "enrich",
                        op = "process_retry_message",
                        correlation_id = %message.correlation_id,
                        activity_id = %message.activity_id,
                        attempt = message.attempt,
                        "Retry ran but indexing failed again; advancing lineage"
                    );
                    let outcome = self
                        .enqueue_for_retry(
                            message.activity_id,
                            message.tenant_id.clone(),
                            message.attempt,
                            &message.original_error,
                            Some(message.correlation_id),
                        )
                        .await?;
                    return Ok(match outcome {
                        RetryOutcome::Requeued { .. } => RetryDisposition::Requeued,
                        RetryOutcome::DeadLettered => RetryDisposition::DeadLettered,
                    });
                }
                info!(
                    subsystem = "enrich",
                    op = "process_retry_message",
                    correlation_id = %message.correlation_id,
                    activity_id = %message.activity_id,
                    attempt = message.attempt,
                    clean = report.clean(),
                    "Retry attempt succeeded"
                );
                Ok(RetryDisposition::Succeeded)
            }
            Err(Error::ActivityNotFound(_)) => {
                warn!(
                    subsystem = "enrich",
                    op = "process_retry_message",
                    correlation_id = %message.correlation_id,
                    activity_id = %message.activity_id,
                    "Activity vanished; dropping retry message"
                );
                Ok(RetryDisposition::Dropped)
            }
            Err(e) => {
                warn!(
                    subsystem = "enrich",
                    op = "process_retry_message",
                    correlation_id = %message.correlation_id,
                    activity_id = %message.activity_id,
                    attempt = message.attempt,
                    error = %e,
                    "Retry attempt failed"
                );
                // The lineage keeps its first error for diagnosis.
                let outcome = self
                    .enqueue_for_retry(
                        message.activity_id,
                        message.tenant_id.clone(),
                        message.attempt,
                        &message.original_error,
                        Some(message.correlation_id),
                    )
                    .await?;
                Ok(match outcome {
                    RetryOutcome::Requeued { .. } => RetryDisposition::Requeued,
                    RetryOutcome::DeadLettered => RetryDisposition::DeadLettered,
                })
            }
        }
    }
}
