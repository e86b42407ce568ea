//! Background consumer for the durable enrichment retry queue.
//!
//! Claims visible messages in small batches, re-runs enrichment for each,
//! and acks every message whose disposition is final (succeeded, requeued,
//! dead-lettered, or dropped). A message whose processing errors out keeps
//! its claim and becomes visible again after the queue's visibility
//! timeout, so no failed attempt is lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use sigmesh_core::{defaults, Error, Result, RetryQueue};
use sigmesh_enrich::{BatchCoordinator, RetryCoordinator, RetryDisposition};

/// How many messages one poll claims.
const CLAIM_BATCH_SIZE: i64 = 10;

/// Configuration for the retry worker loop.
#[derive(Debug, Clone)]
pub struct RetryWorkerConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval_ms: u64,
}

impl Default for RetryWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::RETRY_POLL_INTERVAL_MS,
        }
    }
}

impl RetryWorkerConfig {
    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}

/// Event emitted by the retry worker.
#[derive(Debug, Clone)]
pub enum RetryWorkerEvent {
    Started,
    Stopped,
    /// One claimed batch was processed.
    BatchProcessed {
        claimed: usize,
        succeeded: usize,
        requeued: usize,
        dead_lettered: usize,
        dropped: usize,
    },
}

/// Handle for controlling a running retry worker.
pub struct RetryWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<RetryWorkerEvent>,
}

impl RetryWorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<RetryWorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Polls the retry queue and drives claimed lineages through the
/// coordinator.
pub struct RetryWorker {
    queue: Arc<dyn RetryQueue>,
    retry: Arc<RetryCoordinator>,
    batch: Arc<BatchCoordinator>,
    config: RetryWorkerConfig,
    event_tx: broadcast::Sender<RetryWorkerEvent>,
}

impl RetryWorker {
    pub fn new(
        queue: Arc<dyn RetryQueue>,
        retry: Arc<RetryCoordinator>,
        batch: Arc<BatchCoordinator>,
        config: RetryWorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            queue,
            retry,
            batch,
            config,
            event_tx,
        }
    }

    /// Start the worker loop and return a control handle.
    pub fn start(self) -> RetryWorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        tokio::spawn(async move {
            worker.run(&mut shutdown_rx).await;
        });

        RetryWorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "Retry worker started"
        );
        let _ = self.event_tx.send(RetryWorkerEvent::Started);

        loop {
            let claimed = match self.drain_once().await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(error = %e, "Retry queue poll failed");
                    0
                }
            };

            // An empty poll backs off; a productive one polls again
            // immediately in case more messages are already visible.
            if claimed > 0 {
                if shutdown_rx.try_recv().is_ok() {
                    info!("Retry worker received shutdown signal");
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Retry worker received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
            }
        }

        let _ = self.event_tx.send(RetryWorkerEvent::Stopped);
        info!("Retry worker stopped");
    }

    /// Claim and process one batch. Returns the number of messages claimed.
    pub async fn drain_once(&self) -> Result<usize> {
        let claimed = self.queue.receive(CLAIM_BATCH_SIZE).await?;
        if claimed.is_empty() {
            debug!("Retry queue empty");
            return Ok(0);
        }

        let mut succeeded = 0usize;
        let mut requeued = 0usize;
        let mut dead_lettered = 0usize;
        let mut dropped = 0usize;

        for claim in &claimed {
            match self
                .retry
                .process_retry_message(&claim.message, &self.batch)
                .await
            {
                Ok(disposition) => {
                    match disposition {
                        RetryDisposition::Succeeded => succeeded += 1,
                        RetryDisposition::Requeued => requeued += 1,
                        RetryDisposition::DeadLettered => dead_lettered += 1,
                        RetryDisposition::Dropped => dropped += 1,
                    }
                    if let Err(e) = self.queue.ack(claim.receipt).await {
                        warn!(
                            receipt = %claim.receipt,
                            activity_id = %claim.message.activity_id,
                            error = %e,
                            "Failed to ack retry message"
                        );
                    }
                }
                // Leave the claim in place; the visibility timeout will
                // make the message claimable again.
                Err(e) => {
                    warn!(
                        receipt = %claim.receipt,
                        activity_id = %claim.message.activity_id,
                        attempt = claim.message.attempt,
                        error = %e,
                        "Retry message processing errored, leaving claim for redelivery"
                    );
                }
            }
        }

        info!(
            claimed = claimed.len(),
            succeeded,
            requeued,
            dead_lettered,
            dropped,
            "Processed retry batch"
        );
        let _ = self.event_tx.send(RetryWorkerEvent::BatchProcessed {
            claimed: claimed.len(),
            succeeded,
            requeued,
            dead_lettered,
            dropped,
        });
        Ok(claimed.len())
    }
}
