//! Batch indexing coordinator.
//!
//! Embedding a whole content store takes longer than any single request
//! should, so the work is driven in slices by a polling caller: `init`
//! builds the work queue, then repeated `advance` calls each process one
//! slice and hand back a token for the next call. Cancellation is
//! cooperative at slice granularity, and a crashed caller can resume by
//! calling `init` again and advancing from the reported progress.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use semlink_core::{
    defaults, ContentItem, ContentStore, CustomTarget, CustomTargetRepository, EmbeddingBackend,
    EmbeddingRepository, Error, EventBus, LinkEvent, Result, RunOutcome,
};
use semlink_db::ItemChunker;

/// Configuration for the batch indexer.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Items processed per `advance` call.
    pub slice_size: usize,
    /// Concurrent embedding requests within one slice.
    pub embed_concurrency: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            slice_size: defaults::BATCH_SLICE_SIZE,
            embed_concurrency: defaults::EMBED_CONCURRENCY,
        }
    }
}

impl IndexerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SEMLINK_SLICE_SIZE` | `10` | Items per advance call |
    /// | `SEMLINK_EMBED_CONCURRENCY` | `4` | Concurrent embed requests |
    pub fn from_env() -> Self {
        let slice_size = std::env::var("SEMLINK_SLICE_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::BATCH_SLICE_SIZE)
            .max(1);

        let embed_concurrency = std::env::var("SEMLINK_EMBED_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::EMBED_CONCURRENCY)
            .max(1);

        Self {
            slice_size,
            embed_concurrency,
        }
    }

    /// Set items per slice.
    pub fn with_slice_size(mut self, size: usize) -> Self {
        self.slice_size = size.max(1);
        self
    }

    /// Set concurrent embedding requests.
    pub fn with_embed_concurrency(mut self, n: usize) -> Self {
        self.embed_concurrency = n.max(1);
        self
    }
}

/// Shared cooperative-cancellation handle.
///
/// Clones observe the same flag, so wiring one handle into both the
/// indexer and a matcher lets a single cancel stop the whole pipeline at
/// the next safe boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag for a fresh run.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Lifecycle state of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run has been initialized.
    Idle,
    /// A run is in progress and accepting `advance` calls.
    Running,
    /// Every queued item was processed.
    Completed,
    /// The operator cancelled the run at a slice boundary.
    Cancelled,
    /// A storage fault ended the run; partial progress is persisted.
    Failed,
}

/// Opaque resumption token: the number of items processed so far.
///
/// A retried `advance` with yesterday's token is answered from current
/// progress instead of re-embedding the slice. Serializable so any
/// transport (polling caller, queue, scheduler) can carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchToken(pub u64);

/// Snapshot of a run's progress, returned by `init` and `advance`.
/// Serializable so polling observers can pass it along verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub state: RunState,
    pub processed: u64,
    pub total: u64,
    /// Items skipped after an embedding-provider failure. The run keeps
    /// going; these are retried on the next full run.
    pub failed_items: Vec<i64>,
    /// True when `init` found a run already in flight and returned its
    /// progress instead of starting over.
    pub resumed: bool,
}

impl BatchProgress {
    /// Token for the next `advance` call.
    pub fn next_token(&self) -> BatchToken {
        BatchToken(self.processed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

#[derive(Debug, Clone)]
enum WorkItem {
    Content(ContentItem),
    Custom(CustomTarget),
}

impl WorkItem {
    fn id_for_ledger(&self) -> i64 {
        match self {
            WorkItem::Content(item) => item.id,
            // Custom targets have no content-store id; ledger entries use
            // a sentinel below the content id space.
            WorkItem::Custom(_) => -1,
        }
    }
}

struct RunInner {
    state: RunState,
    queue: Vec<WorkItem>,
    processed: u64,
    failed: Vec<i64>,
}

impl RunInner {
    fn progress(&self, resumed: bool) -> BatchProgress {
        BatchProgress {
            state: self.state,
            processed: self.processed,
            total: self.queue.len() as u64,
            failed_items: self.failed.clone(),
            resumed,
        }
    }
}

enum ItemOutcome {
    Done,
    SkippedFresh,
    ProviderFailure { item_id: i64, reason: String },
}

/// Slice-driven coordinator for embedding content items and custom targets.
pub struct BatchIndexer {
    content: Arc<dyn ContentStore>,
    embeddings: Arc<dyn EmbeddingRepository>,
    custom_targets: Arc<dyn CustomTargetRepository>,
    backend: Arc<dyn EmbeddingBackend>,
    events: EventBus,
    chunker: ItemChunker,
    config: IndexerConfig,
    run: Mutex<RunInner>,
    cancel: CancelFlag,
}

impl BatchIndexer {
    pub fn new(
        content: Arc<dyn ContentStore>,
        embeddings: Arc<dyn EmbeddingRepository>,
        custom_targets: Arc<dyn CustomTargetRepository>,
        backend: Arc<dyn EmbeddingBackend>,
        events: EventBus,
        config: IndexerConfig,
    ) -> Self {
        Self {
            content,
            embeddings,
            custom_targets,
            backend,
            events,
            chunker: ItemChunker::default(),
            config,
            run: Mutex::new(RunInner {
                state: RunState::Idle,
                queue: Vec::new(),
                processed: 0,
                failed: Vec::new(),
            }),
            cancel: CancelFlag::new(),
        }
    }

    /// Handle to this indexer's cancellation flag. Wire the same handle
    /// into a matcher so one cancel stops both.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Initialize a run.
    ///
    /// If a run is already in flight this returns its progress with
    /// `resumed` set instead of restarting, so a caller that lost its
    /// token can pick up where the run left off. From Idle or a terminal
    /// state, a fresh queue is built from the publishable items whose
    /// embeddings are stale by hash comparison, plus custom targets
    /// awaiting an embedding.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "indexer", op = "init"))]
    pub async fn init(&self) -> Result<BatchProgress> {
        let mut run = self.run.lock().await;
        if run.state == RunState::Running {
            info!(
                processed = run.processed,
                total = run.queue.len(),
                "Resuming batch run already in flight"
            );
            return Ok(run.progress(true));
        }

        let items = self.content.list_publishable().await?;
        let pending_targets = self.custom_targets.needing_embedding().await?;

        // The work unit count is the set of items whose stored embedding
        // hash no longer matches their live text, not the whole corpus.
        let stored_hashes: HashMap<i64, String> = self
            .embeddings
            .title_embeddings()
            .await?
            .into_iter()
            .map(|row| (row.item_id, row.content_hash))
            .collect();
        let stale = items.into_iter().filter(|item| {
            stored_hashes
                .get(&item.id)
                .map_or(true, |hash| *hash != self.content.content_hash(item))
        });

        run.queue = stale
            .map(WorkItem::Content)
            .chain(pending_targets.into_iter().map(WorkItem::Custom))
            .collect();
        run.processed = 0;
        run.failed.clear();
        run.state = RunState::Running;
        self.cancel.clear();

        let total = run.queue.len() as u64;
        info!(total, "Batch indexing run initialized");
        self.events.emit(LinkEvent::IndexingStarted { total });

        if run.queue.is_empty() {
            run.state = RunState::Completed;
            self.events.emit(LinkEvent::IndexingFinished {
                outcome: RunOutcome::Completed,
            });
        }

        Ok(run.progress(false))
    }

    /// Process one slice.
    ///
    /// A token behind current progress means the caller retried a slice
    /// that already landed; the current progress is returned without
    /// re-embedding anything. Provider failures skip the item and are
    /// reported in the ledger; a persistence fault fails the whole run.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "indexer", op = "advance", token = token.0))]
    pub async fn advance(&self, token: BatchToken) -> Result<BatchProgress> {
        let mut run = self.run.lock().await;
        if run.state != RunState::Running {
            return Err(Error::State(format!(
                "no run accepting slices (state: {:?})",
                run.state
            )));
        }

        if token.0 < run.processed {
            // Duplicate delivery of an already-processed slice.
            return Ok(run.progress(false));
        }
        if token.0 > run.processed {
            return Err(Error::State(format!(
                "token {} is ahead of run progress {}",
                token.0, run.processed
            )));
        }

        if self.cancel.is_requested() {
            run.state = RunState::Cancelled;
            info!(processed = run.processed, "Batch run cancelled");
            self.events.emit(LinkEvent::IndexingFinished {
                outcome: RunOutcome::Cancelled,
            });
            return Ok(run.progress(false));
        }

        let start = run.processed as usize;
        let end = (start + self.config.slice_size).min(run.queue.len());
        let slice = run.queue[start..end].to_vec();

        let outcomes: Vec<Result<ItemOutcome>> = stream::iter(slice)
            .map(|item| self.process_item(item))
            .buffer_unordered(self.config.embed_concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(ItemOutcome::Done) | Ok(ItemOutcome::SkippedFresh) => {}
                Ok(ItemOutcome::ProviderFailure { item_id, reason }) => {
                    warn!(item_id, reason = %reason, "Embedding provider failure, item skipped");
                    run.failed.push(item_id);
                }
                Err(e) => {
                    run.state = RunState::Failed;
                    tracing::error!(error = %e, "Batch run failed on persistence fault");
                    self.events.emit(LinkEvent::IndexingFinished {
                        outcome: RunOutcome::Failed,
                    });
                    return Err(e);
                }
            }
        }

        run.processed = end as u64;
        let total = run.queue.len() as u64;
        self.events.emit(LinkEvent::SliceCompleted {
            processed: run.processed,
            total,
        });

        if run.processed >= total {
            run.state = RunState::Completed;
            info!(
                total,
                failed = run.failed.len(),
                "Batch indexing run completed"
            );
            self.events.emit(LinkEvent::IndexingFinished {
                outcome: RunOutcome::Completed,
            });
        }

        Ok(run.progress(false))
    }

    /// Request cancellation. Takes effect at the next slice boundary; the
    /// slice currently in flight finishes and its writes stay. A matcher
    /// sharing this indexer's [`CancelFlag`] stops too.
    pub fn cancel(&self) {
        self.cancel.request();
    }

    /// Current progress snapshot.
    pub async fn progress(&self) -> BatchProgress {
        self.run.lock().await.progress(false)
    }

    async fn process_item(&self, item: WorkItem) -> Result<ItemOutcome> {
        let ledger_id = item.id_for_ledger();
        match item {
            WorkItem::Content(item) => {
                let hash = self.content.content_hash(&item);
                if self.embeddings.is_current(item.id, &hash).await? {
                    return Ok(ItemOutcome::SkippedFresh);
                }

                let chunks = self.chunker.chunk(&item.title, &item.body);
                if chunks.is_empty() {
                    return Ok(ItemOutcome::SkippedFresh);
                }

                let vectors = match self.backend.embed_texts(&chunks).await {
                    Ok(v) => v,
                    Err(Error::Embedding(reason)) => {
                        return Ok(ItemOutcome::ProviderFailure {
                            item_id: ledger_id,
                            reason,
                        })
                    }
                    Err(e) => return Err(e),
                };

                self.embeddings
                    .store_item(item.id, chunks.into_iter().zip(vectors).collect(), &hash)
                    .await?;
                Ok(ItemOutcome::Done)
            }
            WorkItem::Custom(target) => {
                let texts = vec![target.embed_text()];
                let mut vectors = match self.backend.embed_texts(&texts).await {
                    Ok(v) => v,
                    Err(Error::Embedding(reason)) => {
                        return Ok(ItemOutcome::ProviderFailure {
                            item_id: ledger_id,
                            reason,
                        })
                    }
                    Err(e) => return Err(e),
                };
                // An empty response is a malformed provider reply, not a
                // persistence fault; it costs this target, not the run.
                let Some(vector) = vectors.pop() else {
                    return Ok(ItemOutcome::ProviderFailure {
                        item_id: ledger_id,
                        reason: "provider returned no vector".to_string(),
                    });
                };
                self.custom_targets.set_embedding(target.id, vector).await?;
                Ok(ItemOutcome::Done)
            }
        }
    }
}
