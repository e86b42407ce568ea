//! Density-based clustering over signal embeddings.
//!
//! Region growing over cosine similarity: a cluster is the set of points
//! reachable from a seed through neighbors at or above the similarity
//! threshold. No fixed cluster count; points that end up in regions
//! smaller than `min_cluster_size` are outliers. Cluster ids are assigned
//! in discovery order and recomputed from scratch on every run; they are
//! not stable identifiers.

use std::collections::VecDeque;

use tracing::debug;
use uuid::Uuid;

use sigmesh_core::{
    ClusterAssignment, ClusterStats, ClusteringConfig, ClusteringOutcome, SignalEmbedding,
};

/// Cosine similarity between two vectors; 0.0 for zero-norm or
/// mismatched-dimension inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Density-based clustering engine.
pub struct ClusteringEngine {
    config: ClusteringConfig,
}

impl ClusteringEngine {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Cluster a set of signal embeddings.
    ///
    /// Empty input produces an empty outcome. Fewer than
    /// `min_cluster_size` signals are all outliers: tiny batches never
    /// produce a degenerate single cluster. The assignment list covers
    /// every input signal; outliers carry the configured sentinel id.
    pub fn cluster(&self, signals: &[SignalEmbedding]) -> ClusteringOutcome {
        if signals.is_empty() {
            return ClusteringOutcome::default();
        }

        if signals.len() < self.config.min_cluster_size {
            return self.all_outliers(signals);
        }

        let n = signals.len();
        // usize::MAX marks unassigned
        let mut membership = vec![usize::MAX; n];
        let mut visited = vec![false; n];
        let mut regions: Vec<Vec<usize>> = Vec::new();

        for seed in 0..n {
            if visited[seed] {
                continue;
            }
            // Grow the region: reachability through any member at or above
            // the similarity threshold.
            let mut region = Vec::new();
            let mut queue = VecDeque::from([seed]);
            visited[seed] = true;
            while let Some(current) = queue.pop_front() {
                region.push(current);
                for other in 0..n {
                    if visited[other] {
                        continue;
                    }
                    let similarity = cosine_similarity(
                        &signals[current].embedding,
                        &signals[other].embedding,
                    );
                    if similarity >= self.config.similarity_threshold {
                        visited[other] = true;
                        queue.push_back(other);
                    }
                }
            }

            // Regions below the size floor dissolve to outliers.
            if region.len() >= self.config.min_cluster_size {
                let cluster_id = regions.len();
                for &idx in &region {
                    membership[idx] = cluster_id;
                }
                regions.push(region);
            }
        }

        let mut outcome = ClusteringOutcome::default();
        for (idx, signal) in signals.iter().enumerate() {
            let cluster_id = if membership[idx] == usize::MAX {
                outcome.outliers.push(signal.id);
                self.config.outlier_cluster_id
            } else {
                membership[idx] as i32
            };
            outcome.assignments.push(ClusterAssignment {
                activity_id: signal.id,
                cluster_id,
            });
        }

        for (cluster_id, region) in regions.iter().enumerate() {
            outcome.cluster_stats.push(ClusterStats {
                cluster_id: cluster_id as i32,
                size: region.len(),
                centroid: centroid(signals, region),
            });
        }

        debug!(
            subsystem = "cluster",
            op = "cluster",
            signals = n,
            cluster_count = outcome.cluster_stats.len(),
            outlier_count = outcome.outliers.len(),
            "Clustering complete"
        );
        outcome
    }

    fn all_outliers(&self, signals: &[SignalEmbedding]) -> ClusteringOutcome {
        ClusteringOutcome {
            assignments: signals
                .iter()
                .map(|s| ClusterAssignment {
                    activity_id: s.id,
                    cluster_id: self.config.outlier_cluster_id,
                })
                .collect(),
            cluster_stats: Vec::new(),
            outliers: signals.iter().map(|s| s.id).collect(),
        }
    }
}

/// Mean vector of the region's member embeddings.
fn centroid(signals: &[SignalEmbedding], region: &[usize]) -> Vec<f32> {
    let Some(&first) = region.first() else {
        return Vec::new();
    };
    let dim = signals[first].embedding.len();
    let mut mean = vec![0.0f32; dim];
    for &idx in region {
        for (acc, value) in mean.iter_mut().zip(signals[idx].embedding.iter()) {
            *acc += value;
        }
    }
    let count = region.len() as f32;
    for value in &mut mean {
        *value /= count;
    }
    mean
}
