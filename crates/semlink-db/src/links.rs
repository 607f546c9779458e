//! Link repository implementation.
//!
//! All dedup gates live here, enforced inside the insert transaction so a
//! violation can never leave a partial write behind.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use semlink_core::{
    validate_target_url, BlacklistEffect, Error, EventBus, Link, LinkEvent, LinkRepository,
    LinkStatus, ProposeLinkRequest, Result,
};

/// PostgreSQL implementation of LinkRepository.
///
/// Holds the event bus so every accepted insertion and status transition
/// fires exactly one `LinkChanged` — the sole invalidation signal for
/// externally cached renderings.
pub struct PgLinkRepository {
    pool: Pool<Postgres>,
    events: EventBus,
}

impl PgLinkRepository {
    /// Create a new PgLinkRepository with the given pool and event bus.
    pub fn new(pool: Pool<Postgres>, events: EventBus) -> Self {
        Self { pool, events }
    }

    fn row_to_link(row: &sqlx::postgres::PgRow) -> Result<Link> {
        let status: String = row.get("status");
        Ok(Link {
            id: row.get("id"),
            source_id: row.get("source_id"),
            anchor_text: row.get("anchor_text"),
            target_url: row.get("target_url"),
            target_id: row.get("target_id"),
            score: row.get("score"),
            status: status.parse().map_err(Error::Serialization)?,
            created_at_utc: row.get("created_at_utc"),
        })
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn propose(&self, req: ProposeLinkRequest) -> Result<Uuid> {
        if req.anchor_text.trim().is_empty() {
            return Err(Error::InvalidInput("empty anchor text".to_string()));
        }
        if !(0.0..=1.0).contains(&req.score) {
            return Err(Error::InvalidInput(format!(
                "score {} outside [0, 1]",
                req.score
            )));
        }
        validate_target_url(&req.target_url)?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Gate order matters for error reporting: per-source anchor
        // consistency, then global anchor consistency, then the duplicate
        // edge check. All three look at active rows only.
        let per_source: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM semantic_link
             WHERE source_id = $1 AND anchor_text = $2 AND target_url != $3
               AND status = 'active'
             LIMIT 1",
        )
        .bind(req.source_id)
        .bind(&req.anchor_text)
        .bind(&req.target_url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if per_source.is_some() {
            return Err(Error::DuplicateLink(format!(
                "anchor {:?} already bound to a different URL in source {}",
                req.anchor_text, req.source_id
            )));
        }

        let global: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM semantic_link
             WHERE anchor_text = $1 AND target_url != $2 AND status = 'active'
             LIMIT 1",
        )
        .bind(&req.anchor_text)
        .bind(&req.target_url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if global.is_some() {
            return Err(Error::DuplicateLink(format!(
                "anchor {:?} already bound to a different URL site-wide",
                req.anchor_text
            )));
        }

        let edge: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM semantic_link
             WHERE source_id = $1 AND target_url = $2 AND status = 'active'
             LIMIT 1",
        )
        .bind(req.source_id)
        .bind(&req.target_url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if edge.is_some() {
            return Err(Error::DuplicateLink(format!(
                "active link from source {} to {:?} already exists",
                req.source_id, req.target_url
            )));
        }

        let link_id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO semantic_link
                 (id, source_id, anchor_text, target_url, target_id, score, status, created_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, 'active', $7)",
        )
        .bind(link_id)
        .bind(req.source_id)
        .bind(&req.anchor_text)
        .bind(&req.target_url)
        .bind(req.target_id)
        .bind(req.score)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::debug!(
            subsystem = "db",
            component = "links",
            op = "propose",
            source_id = req.source_id,
            target_url = %req.target_url,
            "link proposed"
        );
        self.events.emit(LinkEvent::LinkChanged {
            source_id: req.source_id,
        });
        Ok(link_id)
    }

    async fn get(&self, id: Uuid) -> Result<Link> {
        let row = sqlx::query("SELECT * FROM semantic_link WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::LinkNotFound(id))?;
        Self::row_to_link(&row)
    }

    async fn get_by_source(&self, source_id: i64, status: LinkStatus) -> Result<Vec<Link>> {
        let rows = sqlx::query(
            "SELECT * FROM semantic_link
             WHERE source_id = $1 AND status = $2
             ORDER BY score DESC",
        )
        .bind(source_id)
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_link).collect()
    }

    async fn list_all(&self, status: Option<LinkStatus>) -> Result<Vec<Link>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM semantic_link WHERE status = $1
                     ORDER BY created_at_utc DESC",
                )
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM semantic_link ORDER BY created_at_utc DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_link).collect()
    }

    async fn set_status(&self, id: Uuid, status: LinkStatus) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "SELECT source_id, anchor_text, target_url, status FROM semantic_link
             WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::LinkNotFound(id))?;

        let source_id: i64 = row.get("source_id");
        let anchor_text: String = row.get("anchor_text");
        let target_url: String = row.get("target_url");
        let from: LinkStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(Error::InvalidInput)?;

        if from == status {
            return Ok(());
        }

        // Every transition carries its blacklist side effect with it. A bare
        // status write into or out of `rejected` would desynchronize the
        // blacklist, and the next matching pass would undo the change.
        match from.blacklist_effect(status) {
            BlacklistEffect::Add => {
                sqlx::query(
                    "INSERT INTO link_blacklist (id, source_id, target_url, anchor_text, created_at_utc)
                     SELECT $1, $2, $3, $4, $5
                     WHERE NOT EXISTS (
                         SELECT 1 FROM link_blacklist WHERE source_id = $2 AND target_url = $3
                     )",
                )
                .bind(Uuid::now_v7())
                .bind(source_id)
                .bind(&target_url)
                .bind(&anchor_text)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
            BlacklistEffect::Remove => {
                sqlx::query(
                    "DELETE FROM link_blacklist WHERE source_id = $1 AND target_url = $2",
                )
                .bind(source_id)
                .bind(&target_url)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
            BlacklistEffect::None => {}
        }

        sqlx::query("UPDATE semantic_link SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        self.events.emit(LinkEvent::LinkChanged { source_id });
        Ok(())
    }

    async fn reject(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "SELECT source_id, anchor_text, target_url FROM semantic_link
             WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::LinkNotFound(id))?;

        let source_id: i64 = row.get("source_id");
        let anchor_text: String = row.get("anchor_text");
        let target_url: String = row.get("target_url");

        // Blacklist entry and status change are one logical operation: if
        // either half were skipped the next matching pass would disagree
        // with the operator's decision.
        sqlx::query(
            "INSERT INTO link_blacklist (id, source_id, target_url, anchor_text, created_at_utc)
             SELECT $1, $2, $3, $4, $5
             WHERE NOT EXISTS (
                 SELECT 1 FROM link_blacklist WHERE source_id = $2 AND target_url = $3
             )",
        )
        .bind(Uuid::now_v7())
        .bind(source_id)
        .bind(&target_url)
        .bind(&anchor_text)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("UPDATE semantic_link SET status = 'rejected' WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::info!(
            subsystem = "db",
            component = "links",
            op = "reject",
            source_id,
            target_url = %target_url,
            "link rejected and blacklisted"
        );
        self.events.emit(LinkEvent::LinkChanged { source_id });
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "SELECT source_id, target_url FROM semantic_link WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::LinkNotFound(id))?;

        let source_id: i64 = row.get("source_id");
        let target_url: String = row.get("target_url");

        sqlx::query("DELETE FROM link_blacklist WHERE source_id = $1 AND target_url = $2")
            .bind(source_id)
            .bind(&target_url)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query("UPDATE semantic_link SET status = 'active' WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::info!(
            subsystem = "db",
            component = "links",
            op = "restore",
            source_id,
            target_url = %target_url,
            "link restored, blacklist entry removed"
        );
        self.events.emit(LinkEvent::LinkChanged { source_id });
        Ok(())
    }

    async fn active_count_for_source(&self, source_id: i64) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM semantic_link WHERE source_id = $1 AND status = 'active'",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn active_count_to_url(&self, target_url: &str) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM semantic_link WHERE target_url = $1 AND status = 'active'",
        )
        .bind(target_url)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn active_counts_by_target(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query(
            "SELECT target_url, COUNT(*) AS cnt FROM semantic_link
             WHERE status = 'active'
             GROUP BY target_url",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("target_url"), row.get("cnt")))
            .collect())
    }

    async fn active_anchors(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT DISTINCT anchor_text, target_url FROM semantic_link
             WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("anchor_text"), row.get("target_url")))
            .collect())
    }

    async fn delete_by_source(&self, source_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM semantic_link WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_by_target(&self, target_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM semantic_link WHERE target_id = $1")
            .bind(target_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM semantic_link")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
