//! Member identity store implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use sigmesh_core::{Error, IdentityStore, MemberIdentity, NewIdentity, Result};

/// PostgreSQL implementation of [`IdentityStore`].
pub struct PgIdentityStore {
    pool: Pool<Postgres>,
}

impl PgIdentityStore {
    /// Create a new PgIdentityStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_identity_row(row: sqlx::postgres::PgRow) -> MemberIdentity {
        MemberIdentity {
            member_id: row.get("member_id"),
            platform: row.get("platform"),
            username: row.get("username"),
            source_id: row.get("source_id"),
            tenant_id: row.get("tenant_id"),
        }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_platform_and_source_id(
        &self,
        platform: &str,
        source_id: &str,
        tenant_id: &str,
    ) -> Result<Option<MemberIdentity>> {
        let row = sqlx::query(
            "SELECT member_id, platform, username, source_id, tenant_id
             FROM member_identities
             WHERE platform = $1 AND source_id = $2 AND tenant_id = $3",
        )
        .bind(platform)
        .bind(source_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_identity_row))
    }

    async fn find_by_platform_and_username(
        &self,
        platform: &str,
        username: &str,
        tenant_id: &str,
    ) -> Result<Option<MemberIdentity>> {
        let row = sqlx::query(
            "SELECT member_id, platform, username, source_id, tenant_id
             FROM member_identities
             WHERE platform = $1 AND username = $2 AND tenant_id = $3",
        )
        .bind(platform)
        .bind(username)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_identity_row))
    }

    async fn create_identity(&self, identity: NewIdentity) -> Result<()> {
        // Idempotent: a concurrent enrichment pass may have bound the same
        // identity already. Bindings without a platform-native id dedupe on
        // the username instead; an empty source_id must not let the first
        // such binding claim the (platform, '', tenant) slot for everyone.
        if identity.source_id.is_empty() {
            sqlx::query(
                "INSERT INTO member_identities
                     (member_id, platform, username, source_id, tenant_id, created_at)
                 SELECT $1, $2, $3, $4, $5, NOW()
                 WHERE NOT EXISTS (
                     SELECT 1 FROM member_identities
                     WHERE platform = $2 AND username = $3 AND tenant_id = $5
                 )",
            )
            .bind(identity.member_id)
            .bind(&identity.platform)
            .bind(&identity.username)
            .bind(&identity.source_id)
            .bind(&identity.tenant_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        } else {
            sqlx::query(
                "INSERT INTO member_identities
                     (member_id, platform, username, source_id, tenant_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, NOW())
                 ON CONFLICT (platform, source_id, tenant_id) DO NOTHING",
            )
            .bind(identity.member_id)
            .bind(&identity.platform)
            .bind(&identity.username)
            .bind(&identity.source_id)
            .bind(&identity.tenant_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        }

        debug!(
            subsystem = "db",
            op = "create_identity",
            member_id = %identity.member_id,
            platform = %identity.platform,
            tenant_id = %identity.tenant_id,
            "Created member identity"
        );
        Ok(())
    }
}
