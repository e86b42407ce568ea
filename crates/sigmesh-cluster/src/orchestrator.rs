//! Per-tenant clustering orchestration.
//!
//! For each tenant: scroll every indexed signal, cluster, then dual-write
//! cluster ids to the search index and to `signal_metadata.cluster_id` in
//! the primary store in fixed-size batches. The two writes are eventually
//! consistent; a failure on either side is logged with the tenant and the
//! assignment count and does not abort the run.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use sigmesh_core::{
    ActivityStore, ClusteringConfig, ClusteringRunReport, Error, Result, SignalIndex,
    SignalMetadata,
};

use crate::engine::ClusteringEngine;

/// Index-side stats for a tenant, used by operators and the CLI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClusteringStats {
    pub tenant_id: String,
    pub index_exists: bool,
    pub document_count: i64,
}

/// Runs clustering across tenants and writes assignments back.
pub struct ClusteringOrchestrator {
    activities: Arc<dyn ActivityStore>,
    index: Arc<dyn SignalIndex>,
    engine: ClusteringEngine,
    config: ClusteringConfig,
}

impl ClusteringOrchestrator {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        index: Arc<dyn SignalIndex>,
        config: ClusteringConfig,
    ) -> Self {
        Self {
            activities,
            index,
            engine: ClusteringEngine::new(config.clone()),
            config,
        }
    }

    /// Cluster one tenant's signals.
    ///
    /// A tenant with no index yet is skipped (zero signals, success): the
    /// tenant simply has nothing enriched and indexed so far.
    pub async fn cluster_tenant(&self, tenant_id: &str) -> Result<ClusteringRunReport> {
        let started = Instant::now();

        if !self.index.index_exists(tenant_id).await? {
            debug!(
                subsystem = "cluster",
                op = "cluster_tenant",
                tenant_id,
                "No index for tenant, skipping"
            );
            return Ok(ClusteringRunReport {
                tenant_id: tenant_id.to_string(),
                signals_processed: 0,
                clusters_created: 0,
                outliers: 0,
                duration_ms: started.elapsed().as_millis() as u64,
                success: true,
                error: None,
            });
        }

        let signals = self.index.fetch_all_embeddings(tenant_id).await?;
        let outcome = self.engine.cluster(&signals);

        // Dual-write in fixed-size batches. Full-replace semantics: every
        // assignment from this run overwrites whatever the last run wrote.
        let clustered_at = Utc::now();
        for chunk in outcome.assignments.chunks(self.config.write_batch_size) {
            if let Err(e) = self.index.update_cluster_assignments(tenant_id, chunk).await {
                warn!(
                    subsystem = "cluster",
                    op = "cluster_tenant",
                    tenant_id,
                    assignment_count = chunk.len(),
                    error = %e,
                    "Failed to write cluster assignments to index"
                );
            }

            for assignment in chunk {
                let patch = SignalMetadata {
                    cluster_id: Some(assignment.cluster_id),
                    clustered_at: Some(clustered_at),
                    ..SignalMetadata::default()
                };
                match self
                    .activities
                    .update_signal_metadata(assignment.activity_id, &patch)
                    .await
                {
                    Ok(()) => {}
                    // An indexed signal whose activity row has since been
                    // deleted is not an error worth surfacing.
                    Err(Error::ActivityNotFound(_)) => {}
                    Err(e) => {
                        warn!(
                            subsystem = "cluster",
                            op = "cluster_tenant",
                            tenant_id,
                            activity_id = %assignment.activity_id,
                            error = %e,
                            "Failed to write cluster id to activity metadata"
                        );
                    }
                }
            }
        }

        let report = ClusteringRunReport {
            tenant_id: tenant_id.to_string(),
            signals_processed: signals.len(),
            clusters_created: outcome.cluster_stats.len(),
            outliers: outcome.outliers.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            success: true,
            error: None,
        };
        info!(
            subsystem = "cluster",
            op = "cluster_tenant",
            tenant_id,
            signals = report.signals_processed,
            cluster_count = report.clusters_created,
            outlier_count = report.outliers,
            duration_ms = report.duration_ms,
            "Tenant clustering complete"
        );
        Ok(report)
    }

    /// Cluster every tenant that has activities. One tenant's failure is
    /// recorded in its report and never stops the others.
    pub async fn cluster_all_tenants(&self) -> Result<Vec<ClusteringRunReport>> {
        let tenants = self.activities.distinct_tenants().await?;
        let mut reports = Vec::with_capacity(tenants.len());

        for tenant_id in tenants {
            match self.cluster_tenant(&tenant_id).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(
                        subsystem = "cluster",
                        op = "cluster_all_tenants",
                        tenant_id = %tenant_id,
                        error = %e,
                        "Tenant clustering failed"
                    );
                    reports.push(ClusteringRunReport {
                        tenant_id,
                        signals_processed: 0,
                        clusters_created: 0,
                        outliers: 0,
                        duration_ms: 0,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(reports)
    }

    /// Index existence and document count for a tenant.
    pub async fn clustering_stats(&self, tenant_id: &str) -> Result<ClusteringStats> {
        let index_exists = self.index.index_exists(tenant_id).await?;
        let document_count = if index_exists {
            self.index.document_count(tenant_id).await?
        } else {
            0
        };
        Ok(ClusteringStats {
            tenant_id: tenant_id.to_string(),
            index_exists,
            document_count,
        })
    }
}
