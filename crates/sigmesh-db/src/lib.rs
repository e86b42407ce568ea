//! # sigmesh-db
//!
//! PostgreSQL persistence for the sigmesh enrichment pipeline: the
//! activity, member, and identity stores, plus durable retry and
//! dead-letter queues with enforced delayed delivery.
//!
//! All stores share one bounded connection pool. The [`Database`]
//! aggregate wires everything together for binaries.

pub mod activities;
pub mod identities;
pub mod members;
pub mod pool;
pub mod retry_queue;

pub use activities::PgActivityStore;
pub use identities::PgIdentityStore;
pub use members::PgMemberStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use retry_queue::{PgDeadLetterQueue, PgRetryQueue};

use std::sync::Arc;

use sqlx::PgPool;

use sigmesh_core::{ActivityStore, IdentityStore, MemberStore, Result};

/// Aggregate handle over every Postgres-backed collaborator.
pub struct Database {
    pub pool: PgPool,
    pub activities: Arc<dyn ActivityStore>,
    pub members: Arc<dyn MemberStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub retry_queue: Arc<PgRetryQueue>,
    pub dead_letter: Arc<PgDeadLetterQueue>,
}

impl Database {
    /// Connect with default pool configuration and ensure queue schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with_config(database_url, PoolConfig::default()).await
    }

    /// Connect with custom pool configuration and ensure queue schema.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        PgRetryQueue::ensure_schema(&pool).await?;
        Ok(Self::from_pool(pool))
    }

    /// Build the aggregate from an existing pool. Assumes the queue schema
    /// is already in place.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            activities: Arc::new(PgActivityStore::new(pool.clone())),
            members: Arc::new(PgMemberStore::new(pool.clone())),
            identities: Arc::new(PgIdentityStore::new(pool.clone())),
            retry_queue: Arc::new(PgRetryQueue::new(pool.clone())),
            dead_letter: Arc::new(PgDeadLetterQueue::new(pool.clone())),
            pool,
        }
    }
}
