//! Indexing gate and document conversion.
//!
//! Only fully enriched activities are indexed: every indexing-relevant
//! sub-object present, none pending, embedding vector in place. Partially
//! enriched activities are skipped without error; the skip shows up as an
//! unindexed activity in the enrichment report, never as a document with
//! holes in the index.

use std::sync::Arc;

use tracing::debug;

use sigmesh_core::{Activity, Classification, Result, SignalDocument, SignalIndex, SignalScores};

/// Converts enriched activities to documents and writes them to the
/// per-tenant signal index.
pub struct SignalIndexer {
    index: Arc<dyn SignalIndex>,
}

impl SignalIndexer {
    pub fn new(index: Arc<dyn SignalIndex>) -> Self {
        Self { index }
    }

    /// Build the index document for an activity, or `None` when the
    /// activity is not yet fully enriched.
    pub fn document_for(activity: &Activity) -> Option<SignalDocument> {
        let metadata = activity.signal_metadata.as_ref()?;
        if !metadata.is_fully_enriched() {
            return None;
        }

        // is_fully_enriched guarantees these sub-objects are present.
        let embedding = metadata.embedding.as_ref()?.quantized_vector.clone()?;
        let classification: Classification = metadata
            .classification
            .as_ref()
            .map(|c| c.classification.clone())
            .unwrap_or_default();
        let scores: SignalScores = metadata
            .scores
            .as_ref()
            .map(|s| s.scores.clone())
            .unwrap_or_default();
        let dedup = metadata.deduplication.as_ref();

        Some(SignalDocument {
            activity_id: activity.id,
            tenant_id: activity.tenant_id.clone(),
            platform: activity.platform.clone(),
            activity_type: activity.activity_type.clone(),
            timestamp: activity.timestamp,
            member_id: activity.member_id,
            content: activity.text_content(),
            embedding,
            classification,
            scores,
            cluster_id: metadata.cluster_id,
            is_duplicate: dedup.map(|d| d.is_duplicate).unwrap_or(false),
            canonical_id: dedup.and_then(|d| d.canonical_id),
        })
    }

    /// Index a single activity. Returns `Ok(false)` when the activity was
    /// skipped by the enrichment gate; write errors propagate so the
    /// caller can route transient ones to the retry path.
    pub async fn index_activity(&self, activity: &Activity) -> Result<bool> {
        let Some(document) = Self::document_for(activity) else {
            debug!(
                subsystem = "search",
                op = "index_activity",
                activity_id = %activity.id,
                "Skipping partially enriched activity"
            );
            return Ok(false);
        };

        self.index.ensure_index(&activity.tenant_id).await?;
        self.index.index_signal(&activity.tenant_id, &document).await?;
        Ok(true)
    }
}
