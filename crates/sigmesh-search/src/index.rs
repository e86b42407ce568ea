//! pgvector-backed per-tenant signal index.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use sigmesh_core::{
    defaults, ClusterAssignment, Error, IndexConfig, Result, SignalDocument, SignalEmbedding,
    SignalIndex,
};

use crate::tenant::index_name;

/// PostgreSQL + pgvector implementation of [`SignalIndex`].
///
/// One table per tenant, named by [`index_name`]. Embeddings live in a
/// `vector` column with an HNSW index tuned by [`IndexConfig`].
pub struct PgSignalIndex {
    pool: Pool<Postgres>,
    config: IndexConfig,
}

impl PgSignalIndex {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            config: IndexConfig::default(),
        }
    }

    pub fn with_config(pool: Pool<Postgres>, config: IndexConfig) -> Self {
        Self { pool, config }
    }

    fn table(&self, tenant_id: &str) -> Result<String> {
        index_name(&self.config.prefix, tenant_id)
    }

    /// Map a database failure on an index operation into an index error,
    /// carrying whether the condition is transient.
    fn index_error(op: &str, e: sqlx::Error) -> Error {
        let retryable = matches!(
            e,
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
        );
        Error::Index(format!("{op}: {e}"), retryable)
    }
}

#[async_trait]
impl SignalIndex for PgSignalIndex {
    async fn ensure_index(&self, tenant_id: &str) -> Result<()> {
        let table = self.table(tenant_id)?;
        let dim = self.config.embedding_dimension;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| Self::index_error("create_extension", e))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 activity_id UUID PRIMARY KEY,
                 tenant_id TEXT NOT NULL,
                 platform TEXT NOT NULL,
                 activity_type TEXT NOT NULL,
                 timestamp TIMESTAMPTZ NOT NULL,
                 member_id UUID,
                 content TEXT NOT NULL,
                 embedding vector({dim}) NOT NULL,
                 classification JSONB NOT NULL,
                 scores JSONB NOT NULL,
                 cluster_id INTEGER,
                 is_duplicate BOOLEAN NOT NULL DEFAULT FALSE,
                 canonical_id UUID,
                 indexed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             )"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| Self::index_error("create_table", e))?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_embedding_hnsw
             ON {table} USING hnsw (embedding vector_cosine_ops)
             WITH (m = {m}, ef_construction = {ef})",
            m = self.config.hnsw_m,
            ef = self.config.hnsw_ef_construction,
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| Self::index_error("create_hnsw_index", e))?;

        info!(
            subsystem = "search",
            op = "ensure_index",
            tenant_id,
            index = %table,
            "Tenant index ready"
        );
        Ok(())
    }

    async fn index_exists(&self, tenant_id: &str) -> Result<bool> {
        let table = self.table(tenant_id)?;
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::index_error("index_exists", e))?;
        Ok(exists)
    }

    async fn index_signal(&self, tenant_id: &str, document: &SignalDocument) -> Result<()> {
        let table = self.table(tenant_id)?;
        let embedding = Vector::from(document.embedding.clone());
        let classification = serde_json::to_value(&document.classification)?;
        let scores = serde_json::to_value(&document.scores)?;

        sqlx::query(&format!(
            "INSERT INTO {table}
                 (activity_id, tenant_id, platform, activity_type, timestamp, member_id,
                  content, embedding, classification, scores, cluster_id, is_duplicate,
                  canonical_id, indexed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
             ON CONFLICT (activity_id) DO UPDATE SET
                 platform = EXCLUDED.platform,
                 activity_type = EXCLUDED.activity_type,
                 timestamp = EXCLUDED.timestamp,
                 member_id = EXCLUDED.member_id,
                 content = EXCLUDED.content,
                 embedding = EXCLUDED.embedding,
                 classification = EXCLUDED.classification,
                 scores = EXCLUDED.scores,
                 is_duplicate = EXCLUDED.is_duplicate,
                 canonical_id = EXCLUDED.canonical_id,
                 indexed_at = NOW()"
        ))
        .bind(document.activity_id)
        .bind(&document.tenant_id)
        .bind(&document.platform)
        .bind(&document.activity_type)
        .bind(document.timestamp)
        .bind(document.member_id)
        .bind(&document.content)
        .bind(embedding)
        .bind(classification)
        .bind(scores)
        .bind(document.cluster_id)
        .bind(document.is_duplicate)
        .bind(document.canonical_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::index_error("index_signal", e))?;

        debug!(
            subsystem = "search",
            op = "index_signal",
            tenant_id,
            activity_id = %document.activity_id,
            "Indexed signal"
        );
        Ok(())
    }

    async fn bulk_index(&self, tenant_id: &str, documents: &[SignalDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let table = self.table(tenant_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::index_error("bulk_begin", e))?;

        for document in documents {
            let embedding = Vector::from(document.embedding.clone());
            let classification = serde_json::to_value(&document.classification)?;
            let scores = serde_json::to_value(&document.scores)?;

            sqlx::query(&format!(
                "INSERT INTO {table}
                     (activity_id, tenant_id, platform, activity_type, timestamp, member_id,
                      content, embedding, classification, scores, cluster_id, is_duplicate,
                      canonical_id, indexed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
                 ON CONFLICT (activity_id) DO UPDATE SET
                     platform = EXCLUDED.platform,
                     activity_type = EXCLUDED.activity_type,
                     timestamp = EXCLUDED.timestamp,
                     member_id = EXCLUDED.member_id,
                     content = EXCLUDED.content,
                     embedding = EXCLUDED.embedding,
                     classification = EXCLUDED.classification,
                     scores = EXCLUDED.scores,
                     is_duplicate = EXCLUDED.is_duplicate,
                     canonical_id = EXCLUDED.canonical_id,
                     indexed_at = NOW()"
            ))
            .bind(document.activity_id)
            .bind(&document.tenant_id)
            .bind(&document.platform)
            .bind(&document.activity_type)
            .bind(document.timestamp)
            .bind(document.member_id)
            .bind(&document.content)
            .bind(embedding)
            .bind(classification)
            .bind(scores)
            .bind(document.cluster_id)
            .bind(document.is_duplicate)
            .bind(document.canonical_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::index_error("bulk_index", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Self::index_error("bulk_commit", e))?;

        debug!(
            subsystem = "search",
            op = "bulk_index",
            tenant_id,
            document_count = documents.len(),
            "Bulk indexed signals"
        );
        Ok(())
    }

    async fn fetch_all_embeddings(&self, tenant_id: &str) -> Result<Vec<SignalEmbedding>> {
        let table = self.table(tenant_id)?;
        let page_size = defaults::INDEX_SCROLL_PAGE_SIZE;

        // Keyset scroll on the primary key so a large index never has to
        // fit in one result set.
        let mut embeddings = Vec::new();
        let mut cursor = Uuid::nil();
        loop {
            let rows = sqlx::query(&format!(
                "SELECT activity_id, embedding FROM {table}
                 WHERE activity_id > $1
                 ORDER BY activity_id
                 LIMIT $2"
            ))
            .bind(cursor)
            .bind(page_size)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::index_error("fetch_all_embeddings", e))?;

            if rows.is_empty() {
                break;
            }

            for row in &rows {
                let id: Uuid = row.get("activity_id");
                let vector: Vector = row.get("embedding");
                embeddings.push(SignalEmbedding {
                    id,
                    embedding: vector.to_vec(),
                });
                cursor = id;
            }

            if (rows.len() as i64) < page_size {
                break;
            }
        }

        debug!(
            subsystem = "search",
            op = "fetch_all_embeddings",
            tenant_id,
            count = embeddings.len(),
            "Scrolled index embeddings"
        );
        Ok(embeddings)
    }

    async fn update_cluster_assignments(
        &self,
        tenant_id: &str,
        assignments: &[ClusterAssignment],
    ) -> Result<()> {
        if assignments.is_empty() {
            return Ok(());
        }
        let table = self.table(tenant_id)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::index_error("cluster_update_begin", e))?;

        for assignment in assignments {
            sqlx::query(&format!(
                "UPDATE {table} SET cluster_id = $2 WHERE activity_id = $1"
            ))
            .bind(assignment.activity_id)
            .bind(assignment.cluster_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::index_error("cluster_update", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Self::index_error("cluster_update_commit", e))?;

        debug!(
            subsystem = "search",
            op = "update_cluster_assignments",
            tenant_id,
            count = assignments.len(),
            "Updated cluster assignments"
        );
        Ok(())
    }

    async fn delete_signal(&self, tenant_id: &str, activity_id: Uuid) -> Result<()> {
        let table = self.table(tenant_id)?;
        sqlx::query(&format!("DELETE FROM {table} WHERE activity_id = $1"))
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::index_error("delete_signal", e))?;
        Ok(())
    }

    async fn document_count(&self, tenant_id: &str) -> Result<i64> {
        let table = self.table(tenant_id)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::index_error("document_count", e))?;
        Ok(count)
    }
}
