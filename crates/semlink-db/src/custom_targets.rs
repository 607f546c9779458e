//! Custom target repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use semlink_core::{
    defaults, validate_target_url, CreateCustomTargetRequest, CustomTarget,
    CustomTargetRepository, Error, Result, TargetStatus, UpdateCustomTargetRequest,
};

/// PostgreSQL implementation of CustomTargetRepository.
pub struct PgCustomTargetRepository {
    pool: Pool<Postgres>,
}

impl PgCustomTargetRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn row_to_target(row: &sqlx::postgres::PgRow) -> Result<CustomTarget> {
        let status: String = row.get("status");
        Ok(CustomTarget {
            id: row.get("id"),
            url: row.get("url"),
            title: row.get("title"),
            keywords: row.get("keywords"),
            status: status.parse().map_err(Error::Serialization)?,
            embedding: row.get("embedding"),
            created_at_utc: row.get("created_at_utc"),
        })
    }
}

#[async_trait]
impl CustomTargetRepository for PgCustomTargetRepository {
    async fn create(&self, req: CreateCustomTargetRequest) -> Result<Uuid> {
        validate_target_url(&req.url)?;
        if req.title.trim().is_empty() {
            return Err(Error::InvalidInput("empty custom target title".to_string()));
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM custom_target")
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if count >= defaults::MAX_CUSTOM_TARGETS {
            return Err(Error::InvalidInput(format!(
                "custom target limit of {} reached",
                defaults::MAX_CUSTOM_TARGETS
            )));
        }

        let exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM custom_target WHERE url = $1 LIMIT 1")
                .bind(&req.url)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
        if exists.is_some() {
            return Err(Error::InvalidInput(format!(
                "custom target with URL {:?} already exists",
                req.url
            )));
        }

        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO custom_target (id, url, title, keywords, status, embedding, created_at_utc)
             VALUES ($1, $2, $3, $4, 'active', NULL, $5)",
        )
        .bind(id)
        .bind(&req.url)
        .bind(&req.title)
        .bind(&req.keywords)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::debug!(
            subsystem = "db",
            component = "custom_targets",
            op = "create",
            url = %req.url,
            "custom target created"
        );
        Ok(id)
    }

    async fn update(&self, id: Uuid, req: UpdateCustomTargetRequest) -> Result<()> {
        if let Some(url) = &req.url {
            validate_target_url(url)?;
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let current = sqlx::query("SELECT * FROM custom_target WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("custom target {id}")))?;
        let current = Self::row_to_target(&current)?;

        let url = req.url.unwrap_or(current.url);
        let title = req.title.unwrap_or(current.title.clone());
        let keywords = req.keywords.unwrap_or(current.keywords.clone());

        // Title or keyword edits invalidate the embedding; it is regenerated
        // on the next indexing pass from the new text.
        let text_changed = title != current.title || keywords != current.keywords;

        if text_changed {
            sqlx::query(
                "UPDATE custom_target
                 SET url = $2, title = $3, keywords = $4, embedding = NULL
                 WHERE id = $1",
            )
        } else {
            sqlx::query(
                "UPDATE custom_target SET url = $2, title = $3, keywords = $4 WHERE id = $1",
            )
        }
        .bind(id)
        .bind(&url)
        .bind(&title)
        .bind(&keywords)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM custom_target WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("custom target {id}")));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<CustomTarget> {
        let row = sqlx::query("SELECT * FROM custom_target WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("custom target {id}")))?;
        Self::row_to_target(&row)
    }

    async fn list(&self, status: Option<TargetStatus>) -> Result<Vec<CustomTarget>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM custom_target WHERE status = $1
                     ORDER BY created_at_utc DESC",
                )
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM custom_target ORDER BY created_at_utc DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_target).collect()
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM custom_target")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn url_exists(&self, url: &str) -> Result<bool> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM custom_target WHERE url = $1 LIMIT 1")
                .bind(url)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(found.is_some())
    }

    async fn needing_embedding(&self) -> Result<Vec<CustomTarget>> {
        let rows = sqlx::query(
            "SELECT * FROM custom_target
             WHERE status = 'active' AND embedding IS NULL
             ORDER BY created_at_utc",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_target).collect()
    }

    async fn set_embedding(&self, id: Uuid, vector: Vector) -> Result<()> {
        let result = sqlx::query("UPDATE custom_target SET embedding = $2 WHERE id = $1")
            .bind(id)
            .bind(vector)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("custom target {id}")));
        }
        Ok(())
    }

    async fn embedded(&self) -> Result<Vec<CustomTarget>> {
        // NULL embeddings never make it into the matching pass.
        let rows = sqlx::query(
            "SELECT * FROM custom_target
             WHERE status = 'active' AND embedding IS NOT NULL
             ORDER BY created_at_utc",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_target).collect()
    }
}
