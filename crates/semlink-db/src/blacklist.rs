//! Blacklist repository implementation.
//!
//! Entries are keyed on (source_id, target_url); anchor_text is stored only
//! as an annotation of what the link said when it was rejected and never
//! participates in lookups.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use semlink_core::{BlacklistRepository, Error, Result};

/// PostgreSQL implementation of BlacklistRepository.
pub struct PgBlacklistRepository {
    pool: Pool<Postgres>,
}

impl PgBlacklistRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlacklistRepository for PgBlacklistRepository {
    async fn add(&self, source_id: i64, target_url: &str, anchor_text: &str) -> Result<()> {
        // Idempotent: re-adding an existing pair is a no-op.
        sqlx::query(
            "INSERT INTO link_blacklist (id, source_id, target_url, anchor_text, created_at_utc)
             SELECT $1, $2, $3, $4, $5
             WHERE NOT EXISTS (
                 SELECT 1 FROM link_blacklist WHERE source_id = $2 AND target_url = $3
             )",
        )
        .bind(Uuid::now_v7())
        .bind(source_id)
        .bind(target_url)
        .bind(anchor_text)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn contains(&self, source_id: i64, target_url: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM link_blacklist WHERE source_id = $1 AND target_url = $2 LIMIT 1",
        )
        .bind(source_id)
        .bind(target_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(found.is_some())
    }

    async fn remove(&self, source_id: i64, target_url: &str) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM link_blacklist WHERE source_id = $1 AND target_url = $2")
                .bind(source_id)
                .bind(target_url)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_by_source(&self, source_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM link_blacklist WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM link_blacklist")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn load_all_keys(&self) -> Result<HashSet<(i64, String)>> {
        let rows = sqlx::query("SELECT source_id, target_url FROM link_blacklist")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("source_id"), row.get("target_url")))
            .collect())
    }
}
