//! Process-local derived indexes used during a matching run.
//!
//! The matcher evaluates a cluster-size policy and a global anchor gate for
//! every candidate pair. Without caching that is one store query per
//! candidate. Both caches here turn the fan-out into one preload query plus
//! O(1) lookups.
//!
//! Neither cache is authoritative: each is reconstructible from the link
//! store by a single aggregate query, scoped to the lifetime of one
//! matching pass, and rebuilt (not merely trusted) before each run. Any
//! link mutation that bypasses `increment`/`record` must `reset()` the
//! cache to avoid silently serving stale values.

use std::collections::HashMap;

use crate::error::Result;
use crate::traits::LinkRepository;

/// Cache of `target_url → active link count`.
///
/// Owned by one matching-run context and passed by reference into the
/// matcher — never a process-wide singleton.
#[derive(Debug, Default)]
pub struct ActiveCountCache {
    counts: Option<HashMap<String, i64>>,
}

impl ActiveCountCache {
    /// Create an unloaded cache. `get` falls back to direct queries until
    /// `preload` runs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache wholesale from one aggregate query.
    pub async fn preload(&mut self, links: &dyn LinkRepository) -> Result<()> {
        let counts = links.active_counts_by_target().await?;
        tracing::debug!(targets = counts.len(), "active-count cache preloaded");
        self.counts = Some(counts);
        Ok(())
    }

    /// Whether `preload` has run since the last `reset`.
    pub fn is_loaded(&self) -> bool {
        self.counts.is_some()
    }

    /// Active link count for a target URL.
    ///
    /// Served from the cache when loaded; otherwise a direct single-target
    /// query. The cache is an optimization, never a correctness dependency.
    pub async fn get(&self, links: &dyn LinkRepository, target_url: &str) -> Result<i64> {
        match &self.counts {
            Some(counts) => Ok(counts.get(target_url).copied().unwrap_or(0)),
            None => links.active_count_to_url(target_url).await,
        }
    }

    /// Bump the cached count after an accepted insertion. No-op while the
    /// cache is not loaded.
    pub fn increment(&mut self, target_url: &str) {
        if let Some(counts) = &mut self.counts {
            *counts.entry(target_url.to_string()).or_insert(0) += 1;
        }
    }

    /// Discard the cache. The next `get` hits the store directly until the
    /// next `preload`.
    pub fn reset(&mut self) {
        self.counts = None;
    }
}

/// Cache of `anchor_text → target_url` over active links, for the global
/// anchor→URL uniqueness gate. Same preload pattern and the same staleness
/// rules as [`ActiveCountCache`].
#[derive(Debug, Default)]
pub struct AnchorMap {
    anchors: HashMap<String, String>,
}

impl AnchorMap {
    /// Load every distinct (anchor, target) pair from the store.
    pub async fn preload(links: &dyn LinkRepository) -> Result<Self> {
        let mut anchors = HashMap::new();
        for (anchor, url) in links.active_anchors().await? {
            anchors.insert(anchor, url);
        }
        tracing::debug!(anchors = anchors.len(), "anchor map preloaded");
        Ok(Self { anchors })
    }

    /// Would binding `anchor` to `target_url` conflict with an existing
    /// active binding to a different URL?
    pub fn conflicts(&self, anchor: &str, target_url: &str) -> bool {
        match self.anchors.get(anchor) {
            Some(existing) => existing != target_url,
            None => false,
        }
    }

    /// Record an accepted binding so later candidates in the same run see it.
    pub fn record(&mut self, anchor: &str, target_url: &str) {
        self.anchors
            .insert(anchor.to_string(), target_url.to_string());
    }
}
