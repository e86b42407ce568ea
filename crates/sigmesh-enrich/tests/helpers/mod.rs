//! In-memory collaborator implementations and a wired-up harness for
//! coordinator-level tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use sigmesh_core::{
    Activity, ActivityStore, BatchConfig, BatchMetrics, ClaimedRetryMessage, ClusterAssignment,
    DeadLetterMessage, DeadLetterQueue, EmbeddingProvider, Error, FuzzyMatch, IdentityConfig,
    IdentityStore, Member, MemberIdentity, MemberStore, NewIdentity, NewMember, Result,
    RetryConfig, RetryMessage, RetryQueue, SignalDocument, SignalEmbedding, SignalIndex,
    SignalMetadata, StepValue,
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
    pub fail_metadata_writes: AtomicBool,
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
        if self.fail_metadata_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("metadata write rejected".into()));
        }
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

impl InMemoryMemberStore {
    pub fn count(&self) -> usize {
        self.members.lock().unwrap().len()
    }
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
        term: &str,
        tenant_id: &str,
        threshold: f32,
    ) -> Result<Vec<FuzzyMatch>> {
        // Exact case-insensitive equality stands in for trigram similarity.
        let matches = self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .filter(|m| {
                m.display_name.eq_ignore_ascii_case(term)
                    || m.emails.iter().any(|e| e.eq_ignore_ascii_case(term))
            })
            .map(|m| FuzzyMatch {
                member_id: m.id,
                similarity: 1.0,
            })
            .filter(|m| m.similarity >= threshold)
            .collect();
        Ok(matches)
    }
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: Mutex<Vec<MemberIdentity>>,
}

impl InMemoryIdentityStore {
    pub fn count(&self) -> usize {
        self.identities.lock().unwrap().len()
    }
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
        let mut identities = self.identities.lock().unwrap();
        // Same conflict targets as the production store: the platform-native
        // id when present, the username binding otherwise.
        let exists = identities.iter().any(|i| {
            i.platform == identity.platform
                && i.tenant_id == identity.tenant_id
                && if identity.source_id.is_empty() {
                    i.username == identity.username
                } else {
                    i.source_id == identity.source_id
                }
        });
        if !exists {
            identities.push(MemberIdentity {
                member_id: identity.member_id,
                platform: identity.platform,
                username: identity.username,
                source_id: identity.source_id,
                tenant_id: identity.tenant_id,
            });
        }
        Ok(())
    }
}

// =============================================================================
// QUEUES
// =============================================================================

#[derive(Default)]
pub struct InMemoryRetryQueue {
    messages: Mutex<Vec<(Uuid, RetryMessage, u64)>>,
}

impl InMemoryRetryQueue {
    pub fn messages(&self) -> Vec<RetryMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m, _)| m.clone())
            .collect()
    }

    pub fn delays(&self) -> Vec<u64> {
        self.messages.lock().unwrap().iter().map(|(_, _, d)| *d).collect()
    }

    /// Claim every queued message at once.
    pub async fn receive_all(&self) -> Vec<ClaimedRetryMessage> {
        RetryQueue::receive(self, i64::MAX).await.unwrap()
    }
}

#[async_trait]
impl RetryQueue for InMemoryRetryQueue {
    async fn enqueue(&self, message: &RetryMessage, delay_ms: u64) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((Uuid::new_v4(), message.clone(), delay_ms));
        Ok(())
    }

    async fn receive(&self, max_messages: i64) -> Result<Vec<ClaimedRetryMessage>> {
        let mut messages = self.messages.lock().unwrap();
        let take = (max_messages.max(0) as usize).min(messages.len());
        Ok(messages
            .drain(..take)
            .map(|(receipt, message, _)| ClaimedRetryMessage { receipt, message })
            .collect())
    }

    async fn ack(&self, _receipt: Uuid) -> Result<()> {
        Ok(())
    }

    async fn depth(&self) -> Result<i64> {
        Ok(self.messages.lock().unwrap().len() as i64)
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
    write_failure: Mutex<Option<(String, bool)>>,
}

impl InMemorySignalIndex {
    /// Make every write fail with the given index error until healed.
    pub fn fail_writes_with(&self, error: &str, retryable: bool) {
        *self.write_failure.lock().unwrap() = Some((error.to_string(), retryable));
    }

    pub fn heal_writes(&self) {
        *self.write_failure.lock().unwrap() = None;
    }

    pub fn document(&self, tenant_id: &str, activity_id: Uuid) -> Option<SignalDocument> {
        self.documents
            .lock()
            .unwrap()
            .get(&(tenant_id.to_string(), activity_id))
            .cloned()
    }

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
        if let Some((error, retryable)) = self.write_failure.lock().unwrap().clone() {
            return Err(Error::Index(error, retryable));
        }
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
// FAILING PROVIDERS
// =============================================================================

/// Embedding provider whose backend is down.
pub struct FailingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _activity: &Activity) -> Result<StepValue<Vec<f32>>> {
        Err(Error::Embedding("backend offline".into()))
    }
}

// =============================================================================
// HARNESS
// =============================================================================

pub struct Harness {
    pub activities: Arc<InMemoryActivityStore>,
    pub members: Arc<InMemoryMemberStore>,
    pub identities: Arc<InMemoryIdentityStore>,
    pub queue: Arc<InMemoryRetryQueue>,
    pub dead_letter: Arc<InMemoryDeadLetterQueue>,
    pub index: Arc<InMemorySignalIndex>,
    pub pipeline: Arc<EnrichmentPipeline>,
    pub retry: Arc<RetryCoordinator>,
    pub batch: BatchCoordinator,
}

pub fn harness() -> Harness {
    harness_with_embedder(Arc::new(HashEmbeddingProvider::default()))
}

pub fn harness_with_embedder(embedder: Arc<dyn EmbeddingProvider>) -> Harness {
    let activities = Arc::new(InMemoryActivityStore::default());
    let members = Arc::new(InMemoryMemberStore::default());
    let identities = Arc::new(InMemoryIdentityStore::default());
    let queue = Arc::new(InMemoryRetryQueue::default());
    let dead_letter = Arc::new(InMemoryDeadLetterQueue::default());
    let index = Arc::new(InMemorySignalIndex::default());

    let resolver = IdentityResolver::new(
        members.clone(),
        identities.clone(),
        IdentityConfig::default(),
    );
    let pipeline = Arc::new(EnrichmentPipeline::new(
        activities.clone(),
        resolver,
        embedder,
        Arc::new(SignatureDeduplicationProvider::new()),
        Arc::new(KeywordClassificationOracle),
        Arc::new(HeuristicScoringProvider),
        SignalIndexer::new(index.clone()),
    ));
    let retry = Arc::new(RetryCoordinator::new(
        queue.clone(),
        dead_letter.clone(),
        RetryConfig::default(),
    ));
    let batch = BatchCoordinator::new(
        activities.clone(),
        pipeline.clone(),
        retry.clone(),
        BatchConfig::default(),
    );

    Harness {
        activities,
        members,
        identities,
        queue,
        dead_letter,
        index,
        pipeline,
        retry,
        batch,
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub fn activity(tenant: &str, source_id: &str, title: &str, body: &str) -> Activity {
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
        body: Some(body.into()),
        title: Some(title.into()),
        url: None,
        signal_metadata: None,
    }
}

/// Activity with no usable identity information at all.
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
