//! In-memory stores for orchestrator tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use sigmesh_core::{
    Activity, ActivityStore, BatchMetrics, Classification, ClusterAssignment, Error, Result,
    SignalDocument, SignalEmbedding, SignalIndex, SignalMetadata, SignalScores,
};

#[derive(Default)]
pub struct InMemoryActivityStore {
    activities: Mutex<HashMap<Uuid, Activity>>,
}

impl InMemoryActivityStore {
    pub fn insert(&self, activity: Activity) {
        self.activities.lock().unwrap().insert(activity.id, activity);
    }

    pub fn get(&self, id: Uuid) -> Option<Activity> {
        self.activities.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn fetch_unenriched(
        &self,
        _batch_size: i64,
        _tenant_id: Option<&str>,
    ) -> Result<Vec<Activity>> {
        Ok(Vec::new())
    }

    async fn fetch_by_id(&self, activity_id: Uuid) -> Result<Option<Activity>> {
        Ok(self.get(activity_id))
    }

    async fn update_member(&self, activity_id: Uuid, member_id: Uuid) -> Result<()> {
        let mut activities = self.activities.lock().unwrap();
        let activity = activities
            .get_mut(&activity_id)
            .ok_or(Error::ActivityNotFound(activity_id))?;
        activity.member_id = Some(member_id);
        Ok(())
    }

    async fn update_signal_metadata(
        &self,
        activity_id: Uuid,
        metadata: &SignalMetadata,
    ) -> Result<()> {
        let mut activities = self.activities.lock().unwrap();
        let activity = activities
            .get_mut(&activity_id)
            .ok_or(Error::ActivityNotFound(activity_id))?;

        let mut base =
            serde_json::to_value(activity.signal_metadata.clone().unwrap_or_default())?;
        let patch = serde_json::to_value(metadata)?;
        if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
            for (key, value) in patch_obj {
                base_obj.insert(key.clone(), value.clone());
            }
        }
        activity.signal_metadata = Some(serde_json::from_value(base)?);
        Ok(())
    }

    async fn distinct_tenants(&self) -> Result<Vec<String>> {
        let mut tenants: Vec<String> = self
            .activities
            .lock()
            .unwrap()
            .values()
            .map(|a| a.tenant_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        tenants.sort();
        Ok(tenants)
    }

    async fn batch_metrics(&self, _tenant_id: Option<&str>) -> Result<BatchMetrics> {
        Ok(BatchMetrics::default())
    }
}

#[derive(Default)]
pub struct InMemorySignalIndex {
    documents: Mutex<HashMap<(String, Uuid), SignalDocument>>,
    ensured: Mutex<HashSet<String>>,
    pub fail_cluster_writes: AtomicBool,
}

impl InMemorySignalIndex {
    pub fn ensure(&self, tenant_id: &str) {
        self.ensured.lock().unwrap().insert(tenant_id.to_string());
    }

    pub fn insert_embedding(&self, tenant_id: &str, id: Uuid, embedding: Vec<f32>) {
        self.ensure(tenant_id);
        self.documents.lock().unwrap().insert(
            (tenant_id.to_string(), id),
            SignalDocument {
                activity_id: id,
                tenant_id: tenant_id.to_string(),
                platform: "github".into(),
                activity_type: "issue".into(),
                timestamp: Utc::now(),
                member_id: None,
                content: "indexed signal".into(),
                embedding,
                classification: Classification::default(),
                scores: SignalScores::default(),
                cluster_id: None,
                is_duplicate: false,
                canonical_id: None,
            },
        );
    }

    pub fn cluster_id(&self, tenant_id: &str, id: Uuid) -> Option<i32> {
        self.documents
            .lock()
            .unwrap()
            .get(&(tenant_id.to_string(), id))
            .and_then(|d| d.cluster_id)
    }
}

#[async_trait]
impl SignalIndex for InMemorySignalIndex {
    async fn ensure_index(&self, tenant_id: &str) -> Result<()> {
        self.ensure(tenant_id);
        Ok(())
    }

    async fn index_exists(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.ensured.lock().unwrap().contains(tenant_id))
    }

    async fn index_signal(&self, tenant_id: &str, document: &SignalDocument) -> Result<()> {
        self.documents
            .lock()
            .unwrap()
            .insert((tenant_id.to_string(), document.activity_id), document.clone());
        Ok(())
    }

    async fn bulk_index(&self, tenant_id: &str, documents: &[SignalDocument]) -> Result<()> {
        for document in documents {
            self.index_signal(tenant_id, document).await?;
        }
        Ok(())
    }

    async fn fetch_all_embeddings(&self, tenant_id: &str) -> Result<Vec<SignalEmbedding>> {
        let mut embeddings: Vec<SignalEmbedding> = self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|((t, _), _)| t == tenant_id)
            .map(|((_, id), d)| SignalEmbedding {
                id: *id,
                embedding: d.embedding.clone(),
            })
            .collect();
        embeddings.sort_by_key(|e| e.id);
        Ok(embeddings)
    }

    async fn update_cluster_assignments(
        &self,
        tenant_id: &str,
        assignments: &[ClusterAssignment],
    ) -> Result<()> {
        if self
            .fail_cluster_writes
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(Error::Index("cluster write rejected".into(), true));
        }
        let mut documents = self.documents.lock().unwrap();
        for assignment in assignments {
            if let Some(doc) =
                documents.get_mut(&(tenant_id.to_string(), assignment.activity_id))
            {
                doc.cluster_id = Some(assignment.cluster_id);
            }
        }
        Ok(())
    }

    async fn delete_signal(&self, tenant_id: &str, activity_id: Uuid) -> Result<()> {
        self.documents
            .lock()
            .unwrap()
            .remove(&(tenant_id.to_string(), activity_id));
        Ok(())
    }

    async fn document_count(&self, tenant_id: &str) -> Result<i64> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| t == tenant_id)
            .count() as i64)
    }
}

/// An activity row backing an indexed signal.
pub fn activity(id: Uuid, tenant: &str) -> Activity {
    Activity {
        id,
        activity_type: "issue".into(),
        platform: "github".into(),
        timestamp: Utc::now(),
        source_id: "u1".into(),
        member_id: None,
        tenant_id: tenant.into(),
        attributes: serde_json::json!({}),
        body: Some("body".into()),
        title: None,
        url: None,
        signal_metadata: Some(SignalMetadata::default()),
    }
}

/// Unit vector near the given axis, normalized.
pub fn near_axis(dim: usize, axis: usize, wobble: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    v[axis] = 1.0;
    v[(axis + 1) % dim] = wobble;
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}
