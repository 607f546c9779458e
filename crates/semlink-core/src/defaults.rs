//! Centralized default constants for the semlink system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates should reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per body chunk.
pub const CHUNK_SIZE: usize = 1000;

/// Minimum characters per chunk (smaller trailing chunks are merged).
pub const CHUNK_MIN_SIZE: usize = 100;

/// Chunk index reserved for the item's title/summary chunk. This chunk is
/// the unit the matcher treats as the target set.
pub const TITLE_CHUNK_INDEX: i32 = 0;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Timeout for a single embedding request (seconds). A timeout is a
/// per-item failure, never a stall of the whole run.
pub const EMBED_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// BATCH INDEXING
// =============================================================================

/// Items processed per `advance()` slice.
pub const BATCH_SLICE_SIZE: usize = 10;

/// Maximum concurrent embedding requests within one slice. Bounded to
/// respect provider rate limits.
pub const EMBED_CONCURRENCY: usize = 4;

// =============================================================================
// MATCHING
// =============================================================================

/// Minimum cosine similarity for proposing a link to a content item.
pub const SIMILARITY_THRESHOLD: f32 = 0.55;

/// Minimum cosine similarity for proposing a link to a custom target.
/// Custom targets are operator-curated and get their own, usually looser,
/// threshold.
pub const CUSTOM_TARGET_THRESHOLD: f32 = 0.50;

/// Lower clamp bound for the configurable custom-target threshold.
pub const CUSTOM_TARGET_THRESHOLD_MIN: f32 = 0.20;

/// Upper clamp bound for the configurable custom-target threshold.
pub const CUSTOM_TARGET_THRESHOLD_MAX: f32 = 0.90;

/// Cluster-size cap: maximum active links that may point at one target.
pub const MAX_LINKS_PER_TARGET: i64 = 10;

/// Maximum active links a single source item may carry.
pub const MAX_LINKS_PER_SOURCE: i64 = 5;

// =============================================================================
// CUSTOM TARGETS
// =============================================================================

/// Maximum number of custom targets an operator may register.
pub const MAX_CUSTOM_TARGETS: i64 = 100;

// =============================================================================
// EVENTS
// =============================================================================

/// Event bus buffer capacity. 256 for production, tests use smaller.
pub const EVENT_BUS_CAPACITY: usize = 256;
