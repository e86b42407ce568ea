//! # sigmesh-core
//!
//! Core types, traits, and abstractions for the sigmesh signal enrichment
//! pipeline: the shared domain model (activities, members, signal
//! metadata, retry messages, signal documents), the error taxonomy with
//! retryability classification, explicit configuration structs, and the
//! collaborator traits every other crate implements or consumes.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::{
    BatchConfig, ClusteringConfig, EnrichmentConfig, IdentityConfig, IndexConfig, RetryConfig,
    SchedulerConfig,
};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
