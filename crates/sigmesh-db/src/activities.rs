//! Activity store implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use sigmesh_core::{
    Activity, ActivityStore, BatchMetrics, Error, Result, SignalMetadata,
};

/// PostgreSQL implementation of [`ActivityStore`].
pub struct PgActivityStore {
    pool: Pool<Postgres>,
}

impl PgActivityStore {
    /// Create a new PgActivityStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse an activity row into an Activity struct.
    fn parse_activity_row(row: sqlx::postgres::PgRow) -> Result<Activity> {
        let metadata: Option<serde_json::Value> = row.get("signal_metadata");
        let signal_metadata = match metadata {
            Some(value) if !value.is_null() => {
                Some(serde_json::from_value::<SignalMetadata>(value)?)
            }
            _ => None,
        };

        Ok(Activity {
            id: row.get("id"),
            activity_type: row.get("type"),
            platform: row.get("platform"),
            timestamp: row.get("timestamp"),
            source_id: row.get("source_id"),
            member_id: row.get("member_id"),
            tenant_id: row.get("tenant_id"),
            attributes: row.get("attributes"),
            body: row.get("body"),
            title: row.get("title"),
            url: row.get("url"),
            signal_metadata,
        })
    }
}

const ACTIVITY_COLUMNS: &str = "id, type, platform, timestamp, source_id, member_id, \
     tenant_id, attributes, body, title, url, signal_metadata";

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn fetch_unenriched(
        &self,
        batch_size: i64,
        tenant_id: Option<&str>,
    ) -> Result<Vec<Activity>> {
        // Most recent first. Recency bias over FIFO fairness is inherited
        // from the source system; see fetch_unenriched docs on the trait.
        let rows = match tenant_id {
            Some(tenant) => {
                sqlx::query(&format!(
                    "SELECT {ACTIVITY_COLUMNS}
                     FROM activities
                     WHERE tenant_id = $1
                       AND (signal_metadata IS NULL OR signal_metadata = '{{}}'::jsonb)
                     ORDER BY timestamp DESC
                     LIMIT $2"
                ))
                .bind(tenant)
                .bind(batch_size)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ACTIVITY_COLUMNS}
                     FROM activities
                     WHERE signal_metadata IS NULL OR signal_metadata = '{{}}'::jsonb
                     ORDER BY timestamp DESC
                     LIMIT $1"
                ))
                .bind(batch_size)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(Error::Database)?;

        let activities = rows
            .into_iter()
            .map(Self::parse_activity_row)
            .collect::<Result<Vec<_>>>()?;

        debug!(
            subsystem = "db",
            op = "fetch_unenriched",
            count = activities.len(),
            batch_size,
            tenant_id,
            "Fetched unenriched activities"
        );

        Ok(activities)
    }

    async fn fetch_by_id(&self, activity_id: Uuid) -> Result<Option<Activity>> {
        let row = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1"
        ))
        .bind(activity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_activity_row).transpose()
    }

    async fn update_member(&self, activity_id: Uuid, member_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE activities SET member_id = $2 WHERE id = $1")
            .bind(activity_id)
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::ActivityNotFound(activity_id));
        }

        debug!(
            subsystem = "db",
            op = "update_member",
            activity_id = %activity_id,
            member_id = %member_id,
            "Updated activity member"
        );
        Ok(())
    }

    async fn update_signal_metadata(
        &self,
        activity_id: Uuid,
        metadata: &SignalMetadata,
    ) -> Result<()> {
        let value = serde_json::to_value(metadata)?;

        // jsonb concatenation keeps sub-objects from earlier passes:
        // present keys overwrite, absent keys survive.
        let result = sqlx::query(
            "UPDATE activities
             SET signal_metadata = COALESCE(signal_metadata, '{}'::jsonb) || $2
             WHERE id = $1",
        )
        .bind(activity_id)
        .bind(&value)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::ActivityNotFound(activity_id));
        }

        debug!(
            subsystem = "db",
            op = "update_signal_metadata",
            activity_id = %activity_id,
            "Merged signal metadata"
        );
        Ok(())
    }

    async fn distinct_tenants(&self) -> Result<Vec<String>> {
        let tenants: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT tenant_id FROM activities ORDER BY tenant_id")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(tenants)
    }

    async fn batch_metrics(&self, tenant_id: Option<&str>) -> Result<BatchMetrics> {
        let row = match tenant_id {
            Some(tenant) => {
                sqlx::query(
                    "SELECT
                        COUNT(*) FILTER (WHERE signal_metadata IS NULL
                                            OR signal_metadata = '{}'::jsonb) AS unenriched,
                        COUNT(*) AS total,
                        MIN(timestamp) FILTER (WHERE signal_metadata IS NULL
                                                  OR signal_metadata = '{}'::jsonb) AS oldest
                     FROM activities
                     WHERE tenant_id = $1",
                )
                .bind(tenant)
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT
                        COUNT(*) FILTER (WHERE signal_metadata IS NULL
                                            OR signal_metadata = '{}'::jsonb) AS unenriched,
                        COUNT(*) AS total,
                        MIN(timestamp) FILTER (WHERE signal_metadata IS NULL
                                                  OR signal_metadata = '{}'::jsonb) AS oldest
                     FROM activities",
                )
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(Error::Database)?;

        Ok(BatchMetrics {
            unenriched_count: row.get("unenriched"),
            total_activities: row.get("total"),
            oldest_unenriched: row.get("oldest"),
        })
    }
}
