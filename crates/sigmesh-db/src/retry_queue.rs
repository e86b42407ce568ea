//! Durable Postgres-backed retry and dead-letter queues.
//!
//! The retry queue gives at-least-once delivery with enforced delayed
//! visibility: a message enqueued with a delay has `visible_at` in the
//! future and cannot be claimed before then. Claiming pushes `visible_at`
//! forward by the visibility timeout; a consumer that crashes without
//! acking simply lets the message become claimable again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sigmesh_core::{
    defaults, ClaimedRetryMessage, DeadLetterMessage, DeadLetterQueue, Error, Result,
    RetryMessage, RetryQueue,
};

/// PostgreSQL implementation of [`RetryQueue`].
pub struct PgRetryQueue {
    pool: Pool<Postgres>,
    visibility_timeout_secs: i64,
}

impl PgRetryQueue {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            visibility_timeout_secs: defaults::QUEUE_VISIBILITY_TIMEOUT_SECS as i64,
        }
    }

    /// Override the claim visibility timeout.
    pub fn with_visibility_timeout(mut self, secs: u64) -> Self {
        self.visibility_timeout_secs = secs as i64;
        self
    }

    /// Create the queue tables if they do not exist.
    pub async fn ensure_schema(pool: &Pool<Postgres>) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS enrichment_retry_queue (
                 receipt UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                 correlation_id UUID NOT NULL,
                 activity_id UUID NOT NULL,
                 tenant_id TEXT,
                 attempt INTEGER NOT NULL,
                 max_retries INTEGER NOT NULL,
                 original_error TEXT NOT NULL,
                 enqueued_at TIMESTAMPTZ NOT NULL,
                 last_attempt_at TIMESTAMPTZ,
                 visible_at TIMESTAMPTZ NOT NULL
             )",
        )
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_enrichment_retry_queue_visible_at
             ON enrichment_retry_queue (visible_at)",
        )
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS enrichment_dead_letter (
                 id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                 correlation_id UUID NOT NULL,
                 activity_id UUID NOT NULL,
                 tenant_id TEXT,
                 original_error TEXT NOT NULL,
                 failed_at TIMESTAMPTZ NOT NULL,
                 reason TEXT NOT NULL
             )",
        )
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            op = "ensure_queue_schema",
            "Retry queue schema ready"
        );
        Ok(())
    }

    fn parse_claimed_row(row: sqlx::postgres::PgRow) -> ClaimedRetryMessage {
        ClaimedRetryMessage {
            receipt: row.get("receipt"),
            message: RetryMessage {
                correlation_id: row.get("correlation_id"),
                activity_id: row.get("activity_id"),
                tenant_id: row.get("tenant_id"),
                attempt: row.get("attempt"),
                max_retries: row.get("max_retries"),
                original_error: row.get("original_error"),
                enqueued_at: row.get("enqueued_at"),
                last_attempt_at: row.get("last_attempt_at"),
            },
        }
    }
}

#[async_trait]
impl RetryQueue for PgRetryQueue {
    async fn enqueue(&self, message: &RetryMessage, delay_ms: u64) -> Result<()> {
        let visible_at: DateTime<Utc> =
            Utc::now() + chrono::Duration::milliseconds(delay_ms as i64);

        sqlx::query(
            "INSERT INTO enrichment_retry_queue
                 (correlation_id, activity_id, tenant_id, attempt, max_retries,
                  original_error, enqueued_at, last_attempt_at, visible_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(message.correlation_id)
        .bind(message.activity_id)
        .bind(&message.tenant_id)
        .bind(message.attempt)
        .bind(message.max_retries)
        .bind(&message.original_error)
        .bind(message.enqueued_at)
        .bind(message.last_attempt_at)
        .bind(visible_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            op = "retry_enqueue",
            correlation_id = %message.correlation_id,
            activity_id = %message.activity_id,
            attempt = message.attempt,
            delay_ms,
            "Enqueued retry message"
        );
        Ok(())
    }

    async fn receive(&self, max_messages: i64) -> Result<Vec<ClaimedRetryMessage>> {
        // SKIP LOCKED keeps concurrent consumers from claiming the same
        // rows; the visibility bump makes a crashed consumer's claim expire.
        let rows = sqlx::query(
            "UPDATE enrichment_retry_queue
             SET visible_at = NOW() + make_interval(secs => $2)
             WHERE receipt IN (
                 SELECT receipt FROM enrichment_retry_queue
                 WHERE visible_at <= NOW()
                 ORDER BY visible_at
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING receipt, correlation_id, activity_id, tenant_id, attempt,
                       max_retries, original_error, enqueued_at, last_attempt_at",
        )
        .bind(max_messages)
        .bind(self.visibility_timeout_secs as f64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_claimed_row).collect())
    }

    async fn ack(&self, receipt: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM enrichment_retry_queue WHERE receipt = $1")
            .bind(receipt)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            warn!(
                subsystem = "db",
                op = "retry_ack",
                receipt = %receipt,
                "Ack for unknown receipt (visibility timeout elapsed?)"
            );
        }
        Ok(())
    }

    async fn depth(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrichment_retry_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }
}

/// PostgreSQL implementation of [`DeadLetterQueue`].
pub struct PgDeadLetterQueue {
    pool: Pool<Postgres>,
}

impl PgDeadLetterQueue {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Delete dead-letter records older than `retention_days`. Returns the
    /// number of rows removed.
    pub async fn purge_older_than(&self, retention_days: u32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM enrichment_dead_letter
             WHERE failed_at < NOW() - make_interval(days => $1)",
        )
        .bind(retention_days as i32)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(
                subsystem = "db",
                op = "dead_letter_purge",
                purged,
                retention_days,
                "Purged expired dead-letter records"
            );
        }
        Ok(purged)
    }
}

#[async_trait]
impl DeadLetterQueue for PgDeadLetterQueue {
    async fn publish(&self, message: &DeadLetterMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO enrichment_dead_letter
                 (correlation_id, activity_id, tenant_id, original_error, failed_at, reason)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(message.correlation_id)
        .bind(message.activity_id)
        .bind(&message.tenant_id)
        .bind(&message.original_error)
        .bind(message.failed_at)
        .bind(&message.reason)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        warn!(
            subsystem = "db",
            op = "dead_letter_publish",
            correlation_id = %message.correlation_id,
            activity_id = %message.activity_id,
            reason = %message.reason,
            "Message moved to dead-letter queue"
        );
        Ok(())
    }

    async fn depth(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrichment_dead_letter")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }
}
