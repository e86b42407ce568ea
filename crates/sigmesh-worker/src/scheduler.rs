//! Interval-driven workflow scheduling.
//!
//! Runs the enrichment workflow on a fixed interval with a workflow-level
//! timeout, a bounded per-attempt retry policy, and an SLO warning when a
//! run takes longer than the configured threshold without failing it.
//! Manual triggers share the same execution path and return a workflow id
//! for status lookup. Overlap policy is buffer-one: while a run is in
//! flight at most one scheduled tick and one manual trigger stay queued;
//! anything beyond that is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use sigmesh_cluster::ClusteringOrchestrator;
use sigmesh_core::{
    defaults, BatchConfig, Error, Result, SchedulerConfig, WorkflowExecution, WorkflowStatus,
    WorkflowType,
};
use sigmesh_enrich::BatchCoordinator;

/// Event emitted by the workflow scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    SchedulerStarted,
    SchedulerStopped,
    WorkflowStarted {
        workflow_id: Uuid,
        workflow_type: WorkflowType,
    },
    WorkflowCompleted {
        workflow_id: Uuid,
        workflow_type: WorkflowType,
        duration_ms: u64,
    },
    WorkflowFailed {
        workflow_id: Uuid,
        workflow_type: WorkflowType,
        error: String,
    },
    /// The run completed but took longer than the SLO threshold.
    SloWarning {
        workflow_id: Uuid,
        elapsed_ms: u64,
    },
}

/// A queued manual run.
#[derive(Debug)]
struct TriggerRequest {
    workflow_id: Uuid,
    workflow_type: WorkflowType,
    batch_size: Option<i64>,
    tenant_id: Option<String>,
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    trigger_tx: mpsc::Sender<TriggerRequest>,
    event_rx: broadcast::Receiver<SchedulerEvent>,
    executions: Arc<RwLock<HashMap<Uuid, WorkflowExecution>>>,
}

impl SchedulerHandle {
    /// Signal the scheduler to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_rx.resubscribe()
    }

    /// Queue a manual workflow run, returning its workflow id.
    ///
    /// At most one manual run can be queued; a second trigger while one is
    /// pending is rejected.
    pub fn trigger(
        &self,
        workflow_type: WorkflowType,
        batch_size: Option<i64>,
        tenant_id: Option<String>,
    ) -> Result<Uuid> {
        let workflow_id = Uuid::new_v4();
        self.trigger_tx
            .try_send(TriggerRequest {
                workflow_id,
                workflow_type,
                batch_size,
                tenant_id,
            })
            .map_err(|_| {
                Error::Workflow("A manual run is already queued; try again later".into())
            })?;
        Ok(workflow_id)
    }

    /// Look up a workflow execution by id.
    pub async fn status(&self, workflow_id: Uuid) -> Option<WorkflowExecution> {
        self.executions.read().await.get(&workflow_id).cloned()
    }
}

/// Interval scheduler for enrichment and clustering workflows.
pub struct WorkflowScheduler {
    batch: Arc<BatchCoordinator>,
    clustering: Arc<ClusteringOrchestrator>,
    interval_secs: u64,
    config: SchedulerConfig,
    event_tx: broadcast::Sender<SchedulerEvent>,
    executions: Arc<RwLock<HashMap<Uuid, WorkflowExecution>>>,
}

impl WorkflowScheduler {
    pub fn new(
        batch: Arc<BatchCoordinator>,
        clustering: Arc<ClusteringOrchestrator>,
        batch_config: &BatchConfig,
        config: SchedulerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            batch,
            clustering,
            interval_secs: batch_config.interval_secs,
            config,
            event_tx,
            executions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the scheduler loop and return a control handle.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let (trigger_tx, mut trigger_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let executions = self.executions.clone();

        let scheduler = Arc::new(self);
        tokio::spawn(async move {
            scheduler.run(&mut shutdown_rx, &mut trigger_rx).await;
        });

        SchedulerHandle {
            shutdown_tx,
            trigger_tx,
            event_rx,
            executions,
        }
    }

    async fn run(
        &self,
        shutdown_rx: &mut mpsc::Receiver<()>,
        trigger_rx: &mut mpsc::Receiver<TriggerRequest>,
    ) {
        info!(
            interval_secs = self.interval_secs,
            workflow_timeout_secs = self.config.workflow_timeout_secs,
            "Workflow scheduler started"
        );
        let _ = self.event_tx.send(SchedulerEvent::SchedulerStarted);

        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        // A tick missed while a run is in flight coalesces into one
        // delayed tick: the buffer-one half of the overlap policy.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so startup does not
        // race a half-configured deployment.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Workflow scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.execute_workflow(Uuid::new_v4(), WorkflowType::Enrichment, None, None)
                        .await;
                }
                Some(request) = trigger_rx.recv() => {
                    self.execute_workflow(
                        request.workflow_id,
                        request.workflow_type,
                        request.batch_size,
                        request.tenant_id.as_deref(),
                    )
                    .await;
                }
            }
        }

        let _ = self.event_tx.send(SchedulerEvent::SchedulerStopped);
        info!("Workflow scheduler stopped");
    }

    /// Run one workflow end to end: timeout, retries, SLO check, status
    /// bookkeeping, events.
    pub async fn execute_workflow(
        &self,
        workflow_id: Uuid,
        workflow_type: WorkflowType,
        batch_size: Option<i64>,
        tenant_id: Option<&str>,
    ) -> WorkflowStatus {
        let start_time = Utc::now();
        let started = Instant::now();
        self.executions.write().await.insert(
            workflow_id,
            WorkflowExecution {
                id: workflow_id,
                workflow_type,
                status: WorkflowStatus::Running,
                start_time,
                close_time: None,
            },
        );
        info!(
            workflow_id = %workflow_id,
            workflow_type = %workflow_type,
            tenant_id,
            "Workflow started"
        );
        let _ = self.event_tx.send(SchedulerEvent::WorkflowStarted {
            workflow_id,
            workflow_type,
        });

        let outcome = timeout(
            Duration::from_secs(self.config.workflow_timeout_secs),
            self.run_with_retries(workflow_type, batch_size, tenant_id),
        )
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let status = match outcome {
            Ok(Ok(())) => {
                if started.elapsed() >= Duration::from_secs(self.config.slo_warn_secs) {
                    warn!(
                        workflow_id = %workflow_id,
                        duration_ms = elapsed_ms,
                        slo_secs = self.config.slo_warn_secs,
                        "Workflow exceeded SLO threshold"
                    );
                    let _ = self.event_tx.send(SchedulerEvent::SloWarning {
                        workflow_id,
                        elapsed_ms,
                    });
                }
                info!(
                    workflow_id = %workflow_id,
                    workflow_type = %workflow_type,
                    duration_ms = elapsed_ms,
                    "Workflow completed"
                );
                let _ = self.event_tx.send(SchedulerEvent::WorkflowCompleted {
                    workflow_id,
                    workflow_type,
                    duration_ms: elapsed_ms,
                });
                WorkflowStatus::Completed
            }
            Ok(Err(e)) => {
                error!(
                    workflow_id = %workflow_id,
                    workflow_type = %workflow_type,
                    error = %e,
                    "Workflow failed"
                );
                let _ = self.event_tx.send(SchedulerEvent::WorkflowFailed {
                    workflow_id,
                    workflow_type,
                    error: e.to_string(),
                });
                WorkflowStatus::Failed
            }
            Err(_) => {
                error!(
                    workflow_id = %workflow_id,
                    workflow_type = %workflow_type,
                    timeout_secs = self.config.workflow_timeout_secs,
                    "Workflow timed out"
                );
                let _ = self.event_tx.send(SchedulerEvent::WorkflowFailed {
                    workflow_id,
                    workflow_type,
                    error: "workflow timed out".into(),
                });
                WorkflowStatus::TimedOut
            }
        };

        if let Some(execution) = self.executions.write().await.get_mut(&workflow_id) {
            execution.status = status;
            execution.close_time = Some(Utc::now());
        }
        status
    }

    /// Look up a workflow execution directly, without a handle.
    pub async fn execution(&self, workflow_id: Uuid) -> Option<WorkflowExecution> {
        self.executions.read().await.get(&workflow_id).cloned()
    }

    async fn run_with_retries(
        &self,
        workflow_type: WorkflowType,
        batch_size: Option<i64>,
        tenant_id: Option<&str>,
    ) -> Result<()> {
        let mut attempt = 1u32;
        loop {
            match self.run_attempt(workflow_type, batch_size, tenant_id).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.retry_max_attempts => {
                    let delay_ms = (self.config.retry_initial_ms
                        * 2u64.saturating_pow(attempt - 1))
                    .min(self.config.retry_max_ms);
                    warn!(
                        workflow_type = %workflow_type,
                        attempt,
                        delay_ms,
                        error = %e,
                        "Workflow attempt failed, retrying"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_attempt(
        &self,
        workflow_type: WorkflowType,
        batch_size: Option<i64>,
        tenant_id: Option<&str>,
    ) -> Result<()> {
        match workflow_type {
            WorkflowType::Enrichment => {
                let result = self.batch.enrich_batch(batch_size, tenant_id).await?;
                match self.batch.batch_metrics(tenant_id).await {
                    Ok(metrics) => info!(
                        processed = result.processed,
                        enriched = result.enriched,
                        failed = result.failed,
                        backlog = metrics.unenriched_count,
                        "Enrichment workflow metrics"
                    ),
                    Err(e) => warn!(error = %e, "Failed to collect batch metrics"),
                }
                Ok(())
            }
            WorkflowType::Clustering => {
                let reports = match tenant_id {
                    Some(tenant) => vec![self.clustering.cluster_tenant(tenant).await?],
                    None => self.clustering.cluster_all_tenants().await?,
                };
                for report in &reports {
                    if !report.success {
                        warn!(
                            tenant_id = %report.tenant_id,
                            error = report.error.as_deref().unwrap_or("unknown"),
                            "Tenant clustering failed within workflow"
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
