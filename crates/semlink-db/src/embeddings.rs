//! Embedding storage.
//!
//! Upserts are delete-then-insert inside a transaction. A failure on the
//! insert half is surfaced as `Error::Persistence` so callers can tell a
//! storage fault apart from an embedding-provider fault and abort the run.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use semlink_core::{defaults, EmbeddingRepository, EmbeddingRow, Error, Result};

/// PostgreSQL implementation of EmbeddingRepository.
pub struct PgEmbeddingRepository {
    pool: Pool<Postgres>,
}

impl PgEmbeddingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn row_to_embedding(row: &sqlx::postgres::PgRow) -> EmbeddingRow {
        EmbeddingRow {
            id: row.get("id"),
            item_id: row.get("item_id"),
            chunk_index: row.get("chunk_index"),
            chunk_text: row.get("chunk_text"),
            vector: row.get("vector"),
            content_hash: row.get("content_hash"),
        }
    }
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn upsert_chunk(
        &self,
        item_id: i64,
        chunk_index: i32,
        chunk_text: &str,
        vector: Vector,
        content_hash: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM item_embedding WHERE item_id = $1 AND chunk_index = $2")
            .bind(item_id)
            .bind(chunk_index)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO item_embedding (id, item_id, chunk_index, chunk_text, vector, content_hash)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(item_id)
        .bind(chunk_index)
        .bind(chunk_text)
        .bind(vector)
        .bind(content_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(
                subsystem = "db",
                component = "embeddings",
                op = "upsert_chunk",
                item_id,
                chunk_index,
                error = %e,
                "embedding insert failed after delete"
            );
            Error::Persistence(format!(
                "failed to store embedding for item {item_id} chunk {chunk_index}: {e}"
            ))
        })?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn store_item(
        &self,
        item_id: i64,
        chunks: Vec<(String, Vector)>,
        content_hash: &str,
    ) -> Result<()> {
        // All-or-nothing: either the item's full chunk set lands with the
        // new hash, or the previous rows survive untouched.
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM item_embedding WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for (chunk_index, (chunk_text, vector)) in chunks.into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO item_embedding (id, item_id, chunk_index, chunk_text, vector, content_hash)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::now_v7())
            .bind(item_id)
            .bind(chunk_index as i32)
            .bind(&chunk_text)
            .bind(vector)
            .bind(content_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Persistence(format!(
                    "failed to store embedding for item {item_id} chunk {chunk_index}: {e}"
                ))
            })?;
        }

        tx.commit().await.map_err(|e| Error::Persistence(e.to_string()))?;

        tracing::debug!(
            subsystem = "db",
            component = "embeddings",
            op = "store_item",
            item_id,
            "item embeddings stored"
        );
        Ok(())
    }

    async fn get_for_item(&self, item_id: i64) -> Result<Vec<EmbeddingRow>> {
        let rows = sqlx::query(
            "SELECT * FROM item_embedding WHERE item_id = $1 ORDER BY chunk_index",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::row_to_embedding).collect())
    }

    async fn title_embeddings(&self) -> Result<Vec<EmbeddingRow>> {
        let rows = sqlx::query("SELECT * FROM item_embedding WHERE chunk_index = $1")
            .bind(defaults::TITLE_CHUNK_INDEX)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::row_to_embedding).collect())
    }

    async fn is_current(&self, item_id: i64, content_hash: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM item_embedding
             WHERE item_id = $1 AND content_hash = $2
             LIMIT 1",
        )
        .bind(item_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(found.is_some())
    }

    async fn delete_for_item(&self, item_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM item_embedding WHERE item_id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM item_embedding")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
