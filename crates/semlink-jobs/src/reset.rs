//! Full system reset: wipe links, blacklist, and embeddings in one call.
//!
//! The in-flight indexing run (if any) is asked to stop first so a
//! still-advancing batch does not repopulate tables mid-wipe; the cancel
//! lands at the next slice boundary.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use semlink_core::{
    ActiveCountCache, BlacklistRepository, EmbeddingRepository, LinkRepository, Result,
};

use crate::indexer::BatchIndexer;

/// Row counts removed by [`reset_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub links_deleted: u64,
    pub blacklist_deleted: u64,
    pub embeddings_deleted: u64,
}

/// Delete every link, blacklist entry, and stored embedding.
///
/// Cancels the indexer, wipes the three stores, then invalidates the
/// count cache so the next matching pass starts from an empty slate.
#[instrument(
    skip_all,
    fields(subsystem = "jobs", component = "reset", op = "reset_all")
)]
pub async fn reset_all(
    links: Arc<dyn LinkRepository>,
    blacklist: Arc<dyn BlacklistRepository>,
    embeddings: Arc<dyn EmbeddingRepository>,
    indexer: &BatchIndexer,
    cache: &mut ActiveCountCache,
) -> Result<ResetReport> {
    indexer.cancel();

    let links_deleted = links.delete_all().await?;
    let blacklist_deleted = blacklist.delete_all().await?;
    let embeddings_deleted = embeddings.delete_all().await?;
    cache.reset();

    info!(
        links_deleted,
        blacklist_deleted, embeddings_deleted, "System reset complete"
    );

    Ok(ResetReport {
        links_deleted,
        blacklist_deleted,
        embeddings_deleted,
    })
}
