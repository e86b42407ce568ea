//! # sigmesh-cluster
//!
//! Density-based clustering over indexed signal embeddings and the
//! per-tenant orchestration that scrolls, clusters, and dual-writes
//! assignments back to the search index and the primary store.

pub mod engine;
pub mod orchestrator;

pub use engine::{cosine_similarity, ClusteringEngine};
pub use orchestrator::{ClusteringOrchestrator, ClusteringStats};
