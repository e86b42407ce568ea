//! # sigmesh-enrich
//!
//! The enrichment pipeline: identity resolution, the fixed six-step
//! per-activity pipeline, batch coordination, retry handling with
//! exponential backoff and dead-lettering, and the default step provider
//! implementations.

pub mod batch;
pub mod identity;
pub mod pipeline;
pub mod retry;
pub mod steps;

pub use batch::BatchCoordinator;
pub use identity::{extract_identity_info, IdentityInfo, IdentityResolver};
pub use pipeline::{EnrichmentPipeline, EnrichmentReport};
pub use retry::{RetryCoordinator, RetryDisposition, RetryOutcome};
pub use steps::{
    content_signature, HashEmbeddingProvider, HeuristicScoringProvider,
    KeywordClassificationOracle, PendingClassificationOracle, PendingEmbeddingProvider,
    PendingScoringProvider, SignatureDeduplicationProvider,
};
