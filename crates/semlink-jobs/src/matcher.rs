//! Similarity matcher: turns stored embeddings into link proposals.
//!
//! One matching pass compares every item's title embedding against every
//! other item's title embedding plus the embedded custom targets, then
//! walks the candidates best-first through the suppression gates. All
//! lookups a candidate needs (blacklist keys, anchor bindings, per-target
//! active counts) are preloaded once per pass; nothing here issues a query
//! per candidate.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use semlink_core::{
    defaults, ActiveCountCache, AnchorMap, BlacklistRepository, ContentStore,
    CustomTargetRepository, EmbeddingRepository, Error, LinkRepository, ProposeLinkRequest, Result,
};

use crate::indexer::CancelFlag;

/// Similarity scoring over two stored vectors.
///
/// Trait seam so tests can pin scores without constructing collinear
/// vectors.
pub trait Scorer: Send + Sync {
    fn score(&self, a: &[f32], b: &[f32]) -> f32;
}

/// Cosine similarity scorer, the production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineScorer;

impl Scorer for CosineScorer {
    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag_a > 0.0 && mag_b > 0.0 {
            dot / (mag_a * mag_b)
        } else {
            0.0
        }
    }
}

/// Clamp an operator-supplied custom target threshold to a sane range.
pub fn clamp_custom_threshold(raw: f32) -> f32 {
    raw.clamp(
        defaults::CUSTOM_TARGET_THRESHOLD_MIN,
        defaults::CUSTOM_TARGET_THRESHOLD_MAX,
    )
}

/// Configuration for a matching pass.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Minimum cosine similarity for content-to-content candidates.
    pub similarity_threshold: f32,
    /// Minimum similarity for custom target candidates, clamped to
    /// [0.20, 0.90].
    pub custom_target_threshold: f32,
    /// Maximum active links pointing at one target URL (cluster cap).
    pub max_links_per_target: i64,
    /// Maximum active links carried by one source item.
    pub max_links_per_source: i64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            custom_target_threshold: defaults::CUSTOM_TARGET_THRESHOLD,
            max_links_per_target: defaults::MAX_LINKS_PER_TARGET,
            max_links_per_source: defaults::MAX_LINKS_PER_SOURCE,
        }
    }
}

impl MatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SEMLINK_SIMILARITY_THRESHOLD` | `0.55` | Content candidate floor |
    /// | `SEMLINK_CUSTOM_TARGET_THRESHOLD` | `0.50` | Custom target floor, clamped [0.20, 0.90] |
    /// | `SEMLINK_MAX_LINKS_PER_TARGET` | `10` | Cluster cap |
    /// | `SEMLINK_MAX_LINKS_PER_SOURCE` | `5` | Per-source cap |
    pub fn from_env() -> Self {
        let similarity_threshold = std::env::var("SEMLINK_SIMILARITY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(defaults::SIMILARITY_THRESHOLD);

        let custom_target_threshold = std::env::var("SEMLINK_CUSTOM_TARGET_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .map(clamp_custom_threshold)
            .unwrap_or(defaults::CUSTOM_TARGET_THRESHOLD);

        let max_links_per_target = std::env::var("SEMLINK_MAX_LINKS_PER_TARGET")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::MAX_LINKS_PER_TARGET)
            .max(1);

        let max_links_per_source = std::env::var("SEMLINK_MAX_LINKS_PER_SOURCE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::MAX_LINKS_PER_SOURCE)
            .max(1);

        Self {
            similarity_threshold,
            custom_target_threshold,
            max_links_per_target,
            max_links_per_source,
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_custom_target_threshold(mut self, threshold: f32) -> Self {
        self.custom_target_threshold = clamp_custom_threshold(threshold);
        self
    }

    pub fn with_max_links_per_target(mut self, max: i64) -> Self {
        self.max_links_per_target = max.max(1);
        self
    }

    pub fn with_max_links_per_source(mut self, max: i64) -> Self {
        self.max_links_per_source = max.max(1);
        self
    }
}

/// Outcome tally of one matching pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    /// Candidates that cleared the similarity floor.
    pub considered: u64,
    /// Links actually proposed.
    pub proposed: u64,
    pub skipped_blacklist: u64,
    pub skipped_anchor_conflict: u64,
    pub skipped_cluster_cap: u64,
    pub skipped_source_cap: u64,
    /// Candidates the repository's own gates rejected (already linked).
    pub skipped_duplicate: u64,
    /// True when the pass stopped early on a cancellation request; the
    /// tallies cover the sources evaluated before the stop.
    pub cancelled: bool,
}

struct Candidate {
    target_url: String,
    anchor_text: String,
    target_id: Option<i64>,
    score: f32,
}

/// A single matching pass over the stored embeddings.
pub struct LinkMatcher {
    links: Arc<dyn LinkRepository>,
    blacklist: Arc<dyn BlacklistRepository>,
    embeddings: Arc<dyn EmbeddingRepository>,
    custom_targets: Arc<dyn CustomTargetRepository>,
    content: Arc<dyn ContentStore>,
    scorer: Box<dyn Scorer>,
    config: MatcherConfig,
    cancel: Option<CancelFlag>,
}

impl LinkMatcher {
    pub fn new(
        links: Arc<dyn LinkRepository>,
        blacklist: Arc<dyn BlacklistRepository>,
        embeddings: Arc<dyn EmbeddingRepository>,
        custom_targets: Arc<dyn CustomTargetRepository>,
        content: Arc<dyn ContentStore>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            links,
            blacklist,
            embeddings,
            custom_targets,
            content,
            scorer: Box::new(CosineScorer),
            config,
            cancel: None,
        }
    }

    /// Replace the scorer (tests pin scores this way).
    pub fn with_scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// Observe a cancellation flag, typically the driving indexer's
    /// [`CancelFlag`], checked between sources.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run one matching pass. Returns the tally of proposals and skips.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "matcher", op = "run"))]
    pub async fn run(&self) -> Result<MatchReport> {
        let items = self.content.list_publishable().await?;
        let by_id: HashMap<i64, &semlink_core::ContentItem> =
            items.iter().map(|item| (item.id, item)).collect();

        let title_rows = self.embeddings.title_embeddings().await?;
        let blacklist = self.blacklist.load_all_keys().await?;
        let mut anchors = AnchorMap::preload(&*self.links).await?;
        let mut cache = ActiveCountCache::new();
        cache.preload(&*self.links).await?;
        let custom = self.custom_targets.embedded().await?;

        info!(
            sources = title_rows.len(),
            custom_targets = custom.len(),
            "Matching pass started"
        );

        let mut report = MatchReport::default();

        for source in &title_rows {
            if self.cancel.as_ref().is_some_and(|flag| flag.is_requested()) {
                info!(proposed = report.proposed, "Matching pass cancelled");
                report.cancelled = true;
                return Ok(report);
            }
            // Embedding rows can outlive unpublication; those items are
            // neither sources nor targets.
            if !by_id.contains_key(&source.item_id) {
                continue;
            }

            let mut candidates: Vec<Candidate> = Vec::new();

            for target in &title_rows {
                if target.item_id == source.item_id {
                    continue;
                }
                let Some(target_item) = by_id.get(&target.item_id) else {
                    continue;
                };
                let score = self
                    .scorer
                    .score(source.vector.as_slice(), target.vector.as_slice());
                if score >= self.config.similarity_threshold {
                    candidates.push(Candidate {
                        target_url: target_item.url.clone(),
                        anchor_text: target_item.title.clone(),
                        target_id: Some(target_item.id),
                        score,
                    });
                }
            }

            // Operator-curated targets use their own floor and skip the
            // external quality filter entirely; they are trusted by
            // construction.
            for target in &custom {
                let Some(vector) = &target.embedding else {
                    continue;
                };
                let score = self.scorer.score(source.vector.as_slice(), vector.as_slice());
                if score >= self.config.custom_target_threshold {
                    candidates.push(Candidate {
                        target_url: target.url.clone(),
                        anchor_text: target.title.clone(),
                        target_id: None,
                        score,
                    });
                }
            }

            candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

            let mut source_active = self.links.active_count_for_source(source.item_id).await?;

            for candidate in candidates {
                report.considered += 1;

                if source_active >= self.config.max_links_per_source {
                    report.skipped_source_cap += 1;
                    continue;
                }
                if blacklist.contains(&(source.item_id, candidate.target_url.clone())) {
                    report.skipped_blacklist += 1;
                    continue;
                }
                if cache.get(&*self.links, &candidate.target_url).await?
                    >= self.config.max_links_per_target
                {
                    report.skipped_cluster_cap += 1;
                    continue;
                }
                if anchors.conflicts(&candidate.anchor_text, &candidate.target_url) {
                    report.skipped_anchor_conflict += 1;
                    continue;
                }

                match self
                    .links
                    .propose(ProposeLinkRequest {
                        source_id: source.item_id,
                        anchor_text: candidate.anchor_text.clone(),
                        target_url: candidate.target_url.clone(),
                        target_id: candidate.target_id,
                        score: candidate.score.clamp(0.0, 1.0),
                    })
                    .await
                {
                    Ok(_) => {
                        cache.increment(&candidate.target_url);
                        anchors.record(&candidate.anchor_text, &candidate.target_url);
                        source_active += 1;
                        report.proposed += 1;
                        debug!(
                            source_id = source.item_id,
                            target_url = %candidate.target_url,
                            score = candidate.score,
                            "Link proposed"
                        );
                    }
                    Err(Error::DuplicateLink(_)) => {
                        report.skipped_duplicate += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(
            proposed = report.proposed,
            considered = report.considered,
            "Matching pass finished"
        );
        Ok(report)
    }
}
