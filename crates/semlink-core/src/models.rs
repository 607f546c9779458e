//! Core data models for semlink.
//!
//! These types are shared across all semlink crates and represent the
//! link graph, the embedding table, and operator-curated custom targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use pgvector::Vector;

// =============================================================================
// LINK TYPES
// =============================================================================

/// Lifecycle status of a proposed link.
///
/// Links are soft-deleted: status transitions replace row deletion so the
/// audit trail survives rejection and restoration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Proposed and live; counts toward every dedup invariant.
    #[default]
    Active,
    /// Rejected by the operator; paired with a blacklist entry.
    Rejected,
    /// Suppressed by an external quality gate.
    Filtered,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Rejected => write!(f, "rejected"),
            Self::Filtered => write!(f, "filtered"),
        }
    }
}

impl std::str::FromStr for LinkStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "rejected" => Ok(Self::Rejected),
            "filtered" => Ok(Self::Filtered),
            _ => Err(format!("Invalid link status: {}", s)),
        }
    }
}

/// Blacklist side effect required by a status transition.
///
/// The transition function describes its side effects instead of leaving
/// them as separate call sites a caller might forget to invoke together:
/// rejecting a link must add the (source, target) pair to the blacklist,
/// and restoring it must remove that entry — otherwise the next matching
/// pass would immediately re-reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistEffect {
    /// No blacklist change required.
    None,
    /// Add a (source_id, target_url) entry.
    Add,
    /// Remove the (source_id, target_url) entry.
    Remove,
}

impl LinkStatus {
    /// Blacklist side effect of transitioning from `self` to `to`.
    pub fn blacklist_effect(self, to: LinkStatus) -> BlacklistEffect {
        match (self, to) {
            (_, LinkStatus::Rejected) => BlacklistEffect::Add,
            (LinkStatus::Rejected, LinkStatus::Active) => BlacklistEffect::Remove,
            _ => BlacklistEffect::None,
        }
    }
}

/// A proposed or decided directional edge from a source item to a target.
///
/// The target is either a known content item (`target_id` set) or an
/// external URL (`target_id` is `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub source_id: i64,
    pub anchor_text: String,
    pub target_url: String,
    pub target_id: Option<i64>,
    /// Similarity score in [0, 1].
    pub score: f32,
    pub status: LinkStatus,
    pub created_at_utc: DateTime<Utc>,
}

/// Request for proposing a new link.
#[derive(Debug, Clone)]
pub struct ProposeLinkRequest {
    pub source_id: i64,
    pub anchor_text: String,
    pub target_url: String,
    pub target_id: Option<i64>,
    pub score: f32,
}

// =============================================================================
// BLACKLIST TYPES
// =============================================================================

/// A permanent suppression record keyed by (source_id, target_url).
///
/// `anchor_text` is stored as a debugging annotation only and is not part
/// of the matching key: rejecting any anchor to a target blocks all future
/// anchors from that source to that target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub id: Uuid,
    pub source_id: i64,
    pub target_url: String,
    pub anchor_text: String,
    pub created_at_utc: DateTime<Utc>,
}

// =============================================================================
// EMBEDDING TYPES
// =============================================================================

/// A persisted per-(item, chunk) embedding with the content hash used for
/// staleness detection. Chunk 0 is the title/summary chunk.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    pub id: Uuid,
    pub item_id: i64,
    pub chunk_index: i32,
    pub chunk_text: String,
    pub vector: Vector,
    pub content_hash: String,
}

// =============================================================================
// CUSTOM TARGET TYPES
// =============================================================================

/// Status of an operator-curated custom target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    #[default]
    Active,
    Inactive,
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for TargetStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(format!("Invalid target status: {}", s)),
        }
    }
}

/// An operator-entered non-content link destination.
///
/// Capped at [`crate::defaults::MAX_CUSTOM_TARGETS`] entries. Participates
/// in matching exactly like a content item's title chunk once an embedding
/// exists, with its own similarity threshold. Operator-curated destinations
/// are trusted by construction, so they are exempt from the quality-filter
/// pass applied to content-derived links.
#[derive(Debug, Clone)]
pub struct CustomTarget {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub keywords: String,
    pub status: TargetStatus,
    /// `None` until an embedding is generated; excluded from matching
    /// while absent.
    pub embedding: Option<Vector>,
    pub created_at_utc: DateTime<Utc>,
}

impl CustomTarget {
    /// Text sent to the embedding provider: `title [+ " " + keywords]`.
    pub fn embed_text(&self) -> String {
        if self.keywords.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.keywords)
        }
    }
}

/// Request for creating a custom target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomTargetRequest {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub keywords: String,
}

/// Request for updating a custom target. A change to `title` or `keywords`
/// clears the stored embedding so it is regenerated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCustomTargetRequest {
    pub url: Option<String>,
    pub title: Option<String>,
    pub keywords: Option<String>,
}

// =============================================================================
// CONTENT TYPES
// =============================================================================

/// Read-only view of one publishable content item, as exposed by the
/// external content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub url: String,
}
