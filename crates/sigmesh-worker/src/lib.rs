//! # sigmesh-worker
//!
//! Long-running worker process and operational CLIs for the sigmesh
//! enrichment pipeline: the interval workflow scheduler, the retry-queue
//! consumer, and one-shot binaries for batch enrichment, clustering, and
//! manual workflow triggers.

pub mod bootstrap;
pub mod retry_worker;
pub mod scheduler;

pub use bootstrap::{build, database_url, init_tracing, Components};
pub use retry_worker::{RetryWorker, RetryWorkerConfig, RetryWorkerEvent, RetryWorkerHandle};
pub use scheduler::{SchedulerEvent, SchedulerHandle, WorkflowScheduler};
