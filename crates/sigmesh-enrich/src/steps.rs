//! Enrichment step providers.
//!
//! The pipeline's model-backed steps (embedding, deduplication,
//! classification, scoring) are strategy traits. The implementations here
//! are the deterministic defaults: a feature-hash embedder, a
//! content-signature deduplicator, keyword classification, and heuristic
//! scoring. A step without a usable backend reports
//! [`StepValue::Pending`], which keeps the activity out of the search
//! index until a later pass completes it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use sigmesh_core::{
    defaults, Activity, Classification, ClassificationOracle, DedupVerdict,
    DeduplicationProvider, EmbeddingProvider, Result, ScoringProvider, Sentiment, SignalScores,
    StepValue, Urgency,
};

// =============================================================================
// EMBEDDING
// =============================================================================

/// Deterministic feature-hash embedder.
///
/// Derives a fixed-dimension quantized vector from a blake3 XOF over the
/// activity text. Not semantically meaningful, but stable, normalized, and
/// cheap; similar enough inputs hash identically, which is what the
/// deduplication and clustering paths exercise.
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(defaults::EMBED_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, activity: &Activity) -> Result<StepValue<Vec<f32>>> {
        let text = activity.text_content();
        if text.is_empty() {
            return Ok(StepValue::Pending);
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        let mut reader = hasher.finalize_xof();
        let mut bytes = vec![0u8; self.dimension * 4];
        reader.fill(&mut bytes);

        let mut vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| {
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                (raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
            })
            .collect();

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                // normalize and quantize to 3 decimal places
                *x = (*x / norm * 1000.0).round() / 1000.0;
            }
        }

        Ok(StepValue::Ready(vector))
    }
}

/// Embedding provider with no backend: always pending.
pub struct PendingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for PendingEmbeddingProvider {
    async fn embed(&self, _activity: &Activity) -> Result<StepValue<Vec<f32>>> {
        Ok(StepValue::Pending)
    }
}

// =============================================================================
// DEDUPLICATION
// =============================================================================

/// Normalize text for signature computation: lowercase, collapse runs of
/// whitespace.
fn normalized_signature_input(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compute the content signature for an activity's text.
pub fn content_signature(text: &str) -> String {
    blake3::hash(normalized_signature_input(text).as_bytes())
        .to_hex()
        .to_string()
}

/// Content-signature deduplicator.
///
/// Tracks `(tenant, signature) -> first activity id` within the process;
/// the first activity with a given signature is canonical, later ones are
/// flagged duplicates pointing at it.
#[derive(Default)]
pub struct SignatureDeduplicationProvider {
    seen: Mutex<HashMap<(String, String), Uuid>>,
}

impl SignatureDeduplicationProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeduplicationProvider for SignatureDeduplicationProvider {
    async fn check(&self, activity: &Activity) -> Result<StepValue<DedupVerdict>> {
        let text = activity.text_content();
        if text.is_empty() {
            return Ok(StepValue::Pending);
        }
        let signature = content_signature(&text);

        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (activity.tenant_id.clone(), signature.clone());
        match seen.get(&key) {
            Some(canonical) if *canonical != activity.id => Ok(StepValue::Ready(DedupVerdict {
                is_duplicate: true,
                canonical_id: Some(*canonical),
                signature,
            })),
            _ => {
                seen.insert(key, activity.id);
                Ok(StepValue::Ready(DedupVerdict {
                    is_duplicate: false,
                    canonical_id: None,
                    signature,
                }))
            }
        }
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Keyword-driven classification.
///
/// A placeholder oracle ahead of a model-backed one: sentiment, urgency,
/// and intent from keyword hits, confidence scaled by how many signals
/// fired.
#[derive(Default)]
pub struct KeywordClassificationOracle;

const NEGATIVE_WORDS: &[&str] = &["bug", "crash", "broken", "fail", "error", "regression"];
const POSITIVE_WORDS: &[&str] = &["thanks", "great", "love", "awesome", "works"];
const URGENT_WORDS: &[&str] = &["urgent", "critical", "outage", "down", "security", "data loss"];

#[async_trait]
impl ClassificationOracle for KeywordClassificationOracle {
    async fn classify(&self, activity: &Activity) -> Result<StepValue<Classification>> {
        let text = activity.text_content().to_lowercase();
        if text.is_empty() {
            return Ok(StepValue::Pending);
        }

        let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains(**w)).count();
        let positive = POSITIVE_WORDS.iter().filter(|w| text.contains(**w)).count();
        let urgent = URGENT_WORDS.iter().filter(|w| text.contains(**w)).count();

        let sentiment = match (positive, negative) {
            (0, 0) => Sentiment::Neutral,
            (p, n) if p > 0 && n > 0 => Sentiment::Mixed,
            (p, _) if p > 0 => Sentiment::Positive,
            _ => Sentiment::Negative,
        };

        let urgency = if urgent > 0 {
            Urgency::Critical
        } else if negative >= 2 {
            Urgency::High
        } else if negative == 1 {
            Urgency::Medium
        } else {
            Urgency::Low
        };

        let mut intent = Vec::new();
        if negative > 0 {
            intent.push("bug_report".to_string());
        }
        if text.contains("feature") || text.contains("would be nice") || text.contains("request") {
            intent.push("feature_request".to_string());
        }
        if text.contains('?') {
            intent.push("question".to_string());
        }

        let hits = (negative + positive + urgent + intent.len()) as f32;
        let confidence = (0.3 + hits * 0.1).min(0.9);

        Ok(StepValue::Ready(Classification {
            product_area: Vec::new(),
            sentiment,
            urgency,
            intent,
            confidence,
        }))
    }
}

/// Classification oracle with no backend: always pending.
pub struct PendingClassificationOracle;

#[async_trait]
impl ClassificationOracle for PendingClassificationOracle {
    async fn classify(&self, _activity: &Activity) -> Result<StepValue<Classification>> {
        Ok(StepValue::Pending)
    }
}

// =============================================================================
// SCORING
// =============================================================================

/// Heuristic signal scoring from recency and classification labels.
#[derive(Default)]
pub struct HeuristicScoringProvider;

#[async_trait]
impl ScoringProvider for HeuristicScoringProvider {
    async fn score(
        &self,
        activity: &Activity,
        classification: Option<&Classification>,
    ) -> Result<StepValue<SignalScores>> {
        let age_days = (Utc::now() - activity.timestamp).num_hours().max(0) as f32 / 24.0;
        let velocity = 1.0 / (1.0 + age_days);

        let actionability = match classification.map(|c| c.urgency) {
            Some(Urgency::Critical) => 1.0,
            Some(Urgency::High) => 0.75,
            Some(Urgency::Medium) => 0.5,
            Some(Urgency::Low) => 0.25,
            Some(Urgency::Unknown) | None => 0.0,
        };

        let novelty = classification
            .map(|c| 1.0 - c.confidence * 0.5)
            .unwrap_or(0.5);

        Ok(StepValue::Ready(SignalScores {
            velocity,
            cross_platform: 0.0,
            actionability,
            novelty,
        }))
    }
}

/// Scoring provider with no backend: always pending.
pub struct PendingScoringProvider;

#[async_trait]
impl ScoringProvider for PendingScoringProvider {
    async fn score(
        &self,
        _activity: &Activity,
        _classification: Option<&Classification>,
    ) -> Result<StepValue<SignalScores>> {
        Ok(StepValue::Pending)
    }
}
