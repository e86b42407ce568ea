//! In-memory collaborators and a wired-up harness for scheduler and
//! retry-worker tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use sigmesh_cluster::ClusteringOrchestrator;
use sigmesh_core::{
    Activity, ActivityStore, BatchConfig, BatchMetrics, ClaimedRetryMessage, ClusterAssignment,
    ClusteringConfig, DeadLetterMessage, DeadLetterQueue, Error, FuzzyMatch, IdentityConfig,
    IdentityStore, Member, MemberIdentity, MemberStore, NewIdentity, NewMember, Result,
    RetryConfig, RetryMessage, RetryQueue, SignalDocument, SignalEmbedding, SignalIndex,
    SignalMetadata,
};
use sigmesh_enrich::{
    BatchCoordinator, EnrichmentPipeline, HashEmbeddingProvider, HeuristicScoringProvider,
    IdentityResolver, KeywordClassificationOracle, RetryCoordinator,
    SignatureDeduplicationProvider,
};
use sigmesh_search::SignalIndexer;

// =============================================================================
// STORES
// =============================================================================

#[derive(Default)]
pub struct InMemoryActivityStore {
    activities: Mutex<HashMap<Uuid, Activity>>,
    pub fail_fetches: AtomicBool,
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
        batch_size: i64,
        tenant_id: Option<&str>,
    ) -> Result<Vec<Activity>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Error::Internal("activity fetch rejected".into()));
        }
        let mut unenriched: Vec<Activity> = self
            .activities
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.signal_metadata.is_none())
            .filter(|a| tenant_id.map_or(true, |t| a.tenant_id == t))
            .cloned()
            .collect();
        unenriched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        unenriched.truncate(batch_size.max(0) as usize);
        Ok(unenriched)
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

        // Top-level jsonb merge, matching the production write.
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

    async fn batch_metrics(&self, tenant_id: Option<&str>) -> Result<BatchMetrics> {
        let activities = self.activities.lock().unwrap();
        let scoped: Vec<&Activity> = activities
            .values()
            .filter(|a| tenant_id.map_or(true, |t| a.tenant_id == t))
            .collect();
        let unenriched: Vec<&&Activity> = scoped
            .iter()
            .filter(|a| a.signal_metadata.is_none())
            .collect();
        Ok(BatchMetrics {
            unenriched_count: unenriched.len() as i64,
            total_activities: scoped.len() as i64,
            oldest_unenriched: unenriched.iter().map(|a| a.timestamp).min(),
        })
    }
}

#[derive(Default)]
pub struct InMemoryMemberStore {
    members: Mutex<Vec<Member>>,
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn create_member(&self, member: NewMember) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.members.lock().unwrap().push(Member {
            id,
            display_name: member.display_name,
            emails: member.emails,
            attributes: member.attributes,
            tenant_id: member.tenant_id,
        });
        Ok(id)
    }

    async fn find_by_fuzzy_match(
        &self,
        _term: &str,
        _tenant_id: &str,
        _threshold: f32,
    ) -> Result<Vec<FuzzyMatch>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: Mutex<Vec<MemberIdentity>>,
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_platform_and_source_id(
        &self,
        platform: &str,
        source_id: &str,
        tenant_id: &str,
    ) -> Result<Option<MemberIdentity>> {
        Ok(self
            .identities
            .lock()
            .unwrap()
            .iter()
            .find(|i| {
                i.platform == platform && i.source_id == source_id && i.tenant_id == tenant_id
            })
            .cloned())
    }

    async fn find_by_platform_and_username(
        &self,
        platform: &str,
        username: &str,
        tenant_id: &str,
    ) -> Result<Option<MemberIdentity>> {
        Ok(self
            .identities
            .lock()
            .unwrap()
            .iter()
            .find(|i| {
                i.platform == platform && i.username == username && i.tenant_id == tenant_id
            })
            .cloned())
    }

    async fn create_identity(&self, identity: NewIdentity) -> Result<()> {
        self.identities.lock().unwrap().push(MemberIdentity {
            member_id: identity.member_id,
            platform: identity.platform,
            username: identity.username,
            source_id: identity.source_id,
            tenant_id: identity.tenant_id,
        });
        Ok(())
    }
}

// =============================================================================
// QUEUES
// =============================================================================

/// Retry queue that keeps claims in flight until acked, so tests can
/// observe ack behavior.
#[derive(Default)]
pub struct InMemoryRetryQueue {
    visible: Mutex<Vec<(Uuid, RetryMessage)>>,
    in_flight: Mutex<HashMap<Uuid, RetryMessage>>,
}

impl InMemoryRetryQueue {
    pub fn push(&self, message: RetryMessage) {
        self.visible
            .lock()
            .unwrap()
            .push((Uuid::new_v4(), message));
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}

#[async_trait]
impl RetryQueue for InMemoryRetryQueue {
    async fn enqueue(&self, message: &RetryMessage, _delay_ms: u64) -> Result<()> {
        self.push(message.clone());
        Ok(())
    }

    async fn receive(&self, max_messages: i64) -> Result<Vec<ClaimedRetryMessage>> {
        let mut visible = self.visible.lock().unwrap();
        let take = (max_messages.max(0) as usize).min(visible.len());
        let claimed: Vec<ClaimedRetryMessage> = visible
            .drain(..take)
            .map(|(receipt, message)| ClaimedRetryMessage { receipt, message })
            .collect();
        let mut in_flight = self.in_flight.lock().unwrap();
        for claim in &claimed {
            in_flight.insert(claim.receipt, claim.message.clone());
        }
        Ok(claimed)
    }

    async fn ack(&self, receipt: Uuid) -> Result<()> {
        self.in_flight.lock().unwrap().remove(&receipt);
        Ok(())
    }

    async fn depth(&self) -> Result<i64> {
        let visible = self.visible.lock().unwrap().len();
        let in_flight = self.in_flight.lock().unwrap().len();
        Ok((visible + in_flight) as i64)
    }
}

#[derive(Default)]
pub struct InMemoryDeadLetterQueue {
    letters: Mutex<Vec<DeadLetterMessage>>,
}

impl InMemoryDeadLetterQueue {
    pub fn letters(&self) -> Vec<DeadLetterMessage> {
        self.letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterQueue for InMemoryDeadLetterQueue {
    async fn publish(&self, message: &DeadLetterMessage) -> Result<()> {
        self.letters.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn depth(&self) -> Result<i64> {
        Ok(self.letters.lock().unwrap().len() as i64)
    }
}

// =============================================================================
// INDEX
// =============================================================================

#[derive(Default)]
pub struct InMemorySignalIndex {
    documents: Mutex<HashMap<(String, Uuid), SignalDocument>>,
    ensured: Mutex<HashSet<String>>,
}

impl InMemorySignalIndex {
    pub fn count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl SignalIndex for InMemorySignalIndex {
    async fn ensure_index(&self, tenant_id: &str) -> Result<()> {
        self.ensured.lock().unwrap().insert(tenant_id.to_string());
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
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|((t, _), _)| t == tenant_id)
            .map(|((_, id), d)| SignalEmbedding {
                id: *id,
                embedding: d.embedding.clone(),
            })
            .collect())
    }

    async fn update_cluster_assignments(
        &self,
        tenant_id: &str,
        assignments: &[ClusterAssignment],
    ) -> Result<()> {
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

// =============================================================================
// HARNESS
// =============================================================================

pub struct Harness {
    pub activities: Arc<InMemoryActivityStore>,
    pub queue: Arc<InMemoryRetryQueue>,
    pub dead_letter: Arc<InMemoryDeadLetterQueue>,
    pub index: Arc<InMemorySignalIndex>,
    pub pipeline: Arc<EnrichmentPipeline>,
    pub batch: Arc<BatchCoordinator>,
    pub retry: Arc<RetryCoordinator>,
    pub clustering: Arc<ClusteringOrchestrator>,
}

pub fn harness() -> Harness {
    harness_with_retry_config(RetryConfig::default())
}

pub fn harness_with_retry_config(retry_config: RetryConfig) -> Harness {
    let activities = Arc::new(InMemoryActivityStore::default());
    let members = Arc::new(InMemoryMemberStore::default());
    let identities = Arc::new(InMemoryIdentityStore::default());
    let queue = Arc::new(InMemoryRetryQueue::default());
    let dead_letter = Arc::new(InMemoryDeadLetterQueue::default());
    let index = Arc::new(InMemorySignalIndex::default());

    let resolver =
        IdentityResolver::new(members, identities, IdentityConfig::default());
    let pipeline = Arc::new(EnrichmentPipeline::new(
        activities.clone(),
        resolver,
        Arc::new(HashEmbeddingProvider::default()),
        Arc::new(SignatureDeduplicationProvider::new()),
        Arc::new(KeywordClassificationOracle),
        Arc::new(HeuristicScoringProvider),
        SignalIndexer::new(index.clone()),
    ));
    let retry = Arc::new(RetryCoordinator::new(
        queue.clone(),
        dead_letter.clone(),
        retry_config,
    ));
    let batch = Arc::new(BatchCoordinator::new(
        activities.clone(),
        pipeline.clone(),
        retry.clone(),
        BatchConfig::default(),
    ));
    let clustering = Arc::new(ClusteringOrchestrator::new(
        activities.clone(),
        index.clone(),
        ClusteringConfig::default(),
    ));

    Harness {
        activities,
        queue,
        dead_letter,
        index,
        pipeline,
        batch,
        retry,
        clustering,
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub fn activity(tenant: &str, source_id: &str) -> Activity {
    Activity {
        id: Uuid::new_v4(),
        activity_type: "issue".into(),
        platform: "github".into(),
        timestamp: Utc::now(),
        source_id: source_id.into(),
        member_id: None,
        tenant_id: tenant.into(),
        attributes: serde_json::json!({
            "author": { "username": source_id, "name": format!("User {source_id}") }
        }),
        body: Some("search results look wrong on mobile".into()),
        title: Some("Search bug".into()),
        url: None,
        signal_metadata: None,
    }
}

/// Activity whose enrichment hard-fails: no identity information at all.
pub fn anonymous_activity(tenant: &str) -> Activity {
    Activity {
        id: Uuid::new_v4(),
        activity_type: "issue".into(),
        platform: "github".into(),
        timestamp: Utc::now(),
        source_id: "".into(),
        member_id: None,
        tenant_id: tenant.into(),
        attributes: serde_json::json!({}),
        body: Some("anonymous report".into()),
        title: None,
        url: None,
        signal_metadata: None,
    }
}

pub fn retry_message(activity_id: Uuid, tenant: &str, attempt: i32) -> RetryMessage {
    RetryMessage {
        correlation_id: Uuid::new_v4(),
        activity_id,
        tenant_id: Some(tenant.into()),
        attempt,
        max_retries: 3,
        original_error: "Embedding error: backend offline".into(),
        enqueued_at: Utc::now(),
        last_attempt_at: None,
    }
}
