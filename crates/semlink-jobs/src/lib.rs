//! Background coordination for semantic linking.
//!
//! Three concerns live here:
//! - [`BatchIndexer`]: the slice-driven embedding run (content items plus
//!   custom targets), resumable and cancellable between slices.
//! - [`LinkMatcher`]: one similarity pass over stored title embeddings
//!   that proposes links through the repository gates.
//! - [`reset_all`]: full wipe of links, blacklist, and embeddings.

pub mod indexer;
pub mod matcher;
pub mod reset;

pub use indexer::{BatchIndexer, BatchProgress, BatchToken, CancelFlag, IndexerConfig, RunState};
pub use matcher::{CosineScorer, LinkMatcher, MatchReport, MatcherConfig, Scorer};
pub use reset::{reset_all, ResetReport};
