//! Core traits for semlink abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy. The batch coordinator and the matcher are written against them,
//! so tests can drive both with in-memory fakes and production wires in
//! the PostgreSQL repositories.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;

/// Validate that a proposed target URL is well-formed http(s).
///
/// Checked before any dedup gate; a failure here mutates nothing.
pub fn validate_target_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::InvalidInput(format!("malformed target URL {:?}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::InvalidInput(format!(
            "unsupported URL scheme {:?} in {:?}",
            other, raw
        ))),
    }
}

// =============================================================================
// LINK REPOSITORY
// =============================================================================

/// Repository for the proposed-link set.
///
/// `propose` enforces, in order: URL well-formedness, per-source
/// anchor→URL consistency, global anchor→URL consistency, and the
/// per-(source, target) duplicate check. Any violation returns a typed
/// rejection with no partial write. Implementations must raise exactly one
/// `LinkChanged` event per accepted insertion and per status transition.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Insert a new link proposal after running every dedup gate.
    async fn propose(&self, req: ProposeLinkRequest) -> Result<Uuid>;

    /// Fetch a single link by ID.
    async fn get(&self, id: Uuid) -> Result<Link>;

    /// All links for one source item with the given status, best score first.
    async fn get_by_source(&self, source_id: i64, status: LinkStatus) -> Result<Vec<Link>>;

    /// All links, optionally filtered by status, newest first.
    async fn list_all(&self, status: Option<LinkStatus>) -> Result<Vec<Link>>;

    /// Plain status transition (used by the external quality gate for
    /// `filtered`). Fires one `LinkChanged` event.
    async fn set_status(&self, id: Uuid, status: LinkStatus) -> Result<()>;

    /// Reject a link: blacklist its (source, target) pair and transition to
    /// `rejected`, atomically, with one `LinkChanged` event.
    async fn reject(&self, id: Uuid) -> Result<()>;

    /// Restore a rejected link: remove the blacklist entry and transition
    /// back to `active`, atomically, with one `LinkChanged` event. Leaving
    /// the blacklist entry behind would make the next matching pass
    /// immediately re-suppress the link.
    async fn restore(&self, id: Uuid) -> Result<()>;

    /// Count of active links carried by one source item.
    async fn active_count_for_source(&self, source_id: i64) -> Result<i64>;

    /// Count of active links pointing at one target URL (cluster size).
    async fn active_count_to_url(&self, target_url: &str) -> Result<i64>;

    /// One aggregate query: target_url → active link count, for cache
    /// preloading.
    async fn active_counts_by_target(&self) -> Result<HashMap<String, i64>>;

    /// Distinct (anchor_text, target_url) pairs over active links, for the
    /// global anchor gate without per-candidate queries.
    async fn active_anchors(&self) -> Result<Vec<(String, String)>>;

    /// Delete all links where this item is the source. Returns rows deleted.
    async fn delete_by_source(&self, source_id: i64) -> Result<u64>;

    /// Delete all links where this item is the internal target. Returns rows
    /// deleted.
    async fn delete_by_target(&self, target_id: i64) -> Result<u64>;

    /// Delete every link. Returns rows deleted. Callers must `reset()` any
    /// live count cache afterwards.
    async fn delete_all(&self) -> Result<u64>;
}

// =============================================================================
// BLACKLIST REPOSITORY
// =============================================================================

/// Repository for the permanent rejection set, keyed on
/// (source_id, target_url). Anchor text is an annotation, never part of
/// the key.
#[async_trait]
pub trait BlacklistRepository: Send + Sync {
    /// Add an entry. Idempotent: a no-op if the key already exists.
    async fn add(&self, source_id: i64, target_url: &str, anchor_text: &str) -> Result<()>;

    /// Is this (source, target) pair suppressed?
    async fn contains(&self, source_id: i64, target_url: &str) -> Result<bool>;

    /// Remove a specific entry. Returns rows deleted (0 or 1).
    async fn remove(&self, source_id: i64, target_url: &str) -> Result<u64>;

    /// Remove every entry for one source item. Returns rows deleted.
    async fn delete_by_source(&self, source_id: i64) -> Result<u64>;

    /// Remove every entry. Returns rows deleted.
    async fn delete_all(&self) -> Result<u64>;

    /// Load every key into memory for a matching run, turning an
    /// O(candidates) query fan-out into O(1) lookups.
    async fn load_all_keys(&self) -> Result<HashSet<(i64, String)>>;
}

// =============================================================================
// EMBEDDING REPOSITORY
// =============================================================================

/// Repository for persisted per-(item, chunk) vectors.
///
/// Upsert semantics are delete-then-insert, not update-in-place: a failed
/// insert after a successful delete surfaces as [`Error::Persistence`],
/// a detectable error state rather than silent data loss.
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Replace the single row for (item_id, chunk_index).
    async fn upsert_chunk(
        &self,
        item_id: i64,
        chunk_index: i32,
        chunk_text: &str,
        vector: Vector,
        content_hash: &str,
    ) -> Result<()>;

    /// Replace every row for one item with the given chunk set, atomically.
    /// A mid-slice crash never leaves a partially-chunked item behind.
    async fn store_item(
        &self,
        item_id: i64,
        chunks: Vec<(String, Vector)>,
        content_hash: &str,
    ) -> Result<()>;

    /// All rows for one item, ordered by chunk index.
    async fn get_for_item(&self, item_id: i64) -> Result<Vec<EmbeddingRow>>;

    /// Title-chunk rows (chunk 0) across all items: the matcher's target set.
    async fn title_embeddings(&self) -> Result<Vec<EmbeddingRow>>;

    /// Does a row exist for this item with the expected content hash? If so
    /// the item has not changed since the last embedding run and no provider
    /// call is needed.
    async fn is_current(&self, item_id: i64, content_hash: &str) -> Result<bool>;

    /// Delete every row for one item. Returns rows deleted.
    async fn delete_for_item(&self, item_id: i64) -> Result<u64>;

    /// Delete every row. Returns rows deleted.
    async fn delete_all(&self) -> Result<u64>;
}

// =============================================================================
// CUSTOM TARGET REPOSITORY
// =============================================================================

/// Repository for operator-curated custom targets.
#[async_trait]
pub trait CustomTargetRepository: Send + Sync {
    /// Insert a new custom target. Rejects duplicates of an existing URL and
    /// refuses to exceed [`crate::defaults::MAX_CUSTOM_TARGETS`].
    async fn create(&self, req: CreateCustomTargetRequest) -> Result<Uuid>;

    /// Update a custom target. A title or keyword change clears the stored
    /// embedding so it is regenerated from the new text.
    async fn update(&self, id: Uuid, req: UpdateCustomTargetRequest) -> Result<()>;

    /// Delete a custom target.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Fetch one custom target by ID.
    async fn get(&self, id: Uuid) -> Result<CustomTarget>;

    /// All custom targets, optionally filtered by status, newest first.
    async fn list(&self, status: Option<TargetStatus>) -> Result<Vec<CustomTarget>>;

    /// Total number of custom targets.
    async fn count(&self) -> Result<i64>;

    /// Does a custom target with this URL already exist?
    async fn url_exists(&self, url: &str) -> Result<bool>;

    /// Active targets with no stored embedding yet.
    async fn needing_embedding(&self) -> Result<Vec<CustomTarget>>;

    /// Store a freshly generated embedding.
    async fn set_embedding(&self, id: Uuid, vector: Vector) -> Result<()>;

    /// Active targets that have an embedding and may participate in
    /// matching.
    async fn embedded(&self) -> Result<Vec<CustomTarget>>;
}

// =============================================================================
// CONTENT STORE
// =============================================================================

/// Read-only view of publishable content items. External collaborator;
/// trashed and unpublished items never appear here.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Every publishable item, in a stable order.
    async fn list_publishable(&self) -> Result<Vec<ContentItem>>;

    /// Fingerprint of an item's text, used for embedding staleness checks.
    fn content_hash(&self, item: &ContentItem) -> String {
        crate::hashing::content_hash(&item.title, &item.body)
    }
}

// =============================================================================
// EMBEDDING BACKEND
// =============================================================================

/// Backend for generating embeddings (text → vector).
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Model name being used.
    fn model_name(&self) -> &str;
}
