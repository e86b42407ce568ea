//! Member store implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use sigmesh_core::{Error, FuzzyMatch, MemberStore, NewMember, Result};

/// PostgreSQL implementation of [`MemberStore`].
///
/// Fuzzy matching uses the `pg_trgm` extension's `similarity()` function
/// across member display names, identity usernames, and email addresses.
pub struct PgMemberStore {
    pool: Pool<Postgres>,
}

impl PgMemberStore {
    /// Create a new PgMemberStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberStore for PgMemberStore {
    async fn create_member(&self, member: NewMember) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let emails = serde_json::to_value(&member.emails)?;

        sqlx::query(
            "INSERT INTO members (id, display_name, emails, attributes, tenant_id, created_at)
             VALUES ($1, $2, $3, $4, $5, NOW())",
        )
        .bind(id)
        .bind(&member.display_name)
        .bind(&emails)
        .bind(&member.attributes)
        .bind(&member.tenant_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            op = "create_member",
            member_id = %id,
            tenant_id = %member.tenant_id,
            "Created member"
        );
        Ok(id)
    }

    async fn find_by_fuzzy_match(
        &self,
        term: &str,
        tenant_id: &str,
        threshold: f32,
    ) -> Result<Vec<FuzzyMatch>> {
        // Best similarity across display name, any identity username, and
        // any email; one row per member.
        let rows = sqlx::query(
            "SELECT m.id,
                    GREATEST(
                        similarity(m.display_name, $1),
                        COALESCE(MAX(similarity(mi.username, $1)), 0),
                        COALESCE(MAX(similarity(e.email, $1)), 0)
                    ) AS score
             FROM members m
             LEFT JOIN member_identities mi ON mi.member_id = m.id
             LEFT JOIN LATERAL jsonb_array_elements_text(m.emails) AS e(email) ON TRUE
             WHERE m.tenant_id = $2
             GROUP BY m.id, m.display_name
             HAVING GREATEST(
                        similarity(m.display_name, $1),
                        COALESCE(MAX(similarity(mi.username, $1)), 0),
                        COALESCE(MAX(similarity(e.email, $1)), 0)
                    ) >= $3
             ORDER BY score DESC
             LIMIT 10",
        )
        .bind(term)
        .bind(tenant_id)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let matches = rows
            .into_iter()
            .map(|row| FuzzyMatch {
                member_id: row.get("id"),
                similarity: row.get("score"),
            })
            .collect::<Vec<_>>();

        debug!(
            subsystem = "db",
            op = "find_by_fuzzy_match",
            tenant_id,
            threshold,
            count = matches.len(),
            "Fuzzy member match"
        );
        Ok(matches)
    }
}
