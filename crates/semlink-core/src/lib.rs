//! # semlink-core
//!
//! Core types, traits, and abstractions for semlink — the link consistency
//! and batch-indexing coordination layer.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the other semlink crates depend on: the link/blacklist
//! data model with its dedup invariants, the run-scoped caches, the event
//! bus carrying link-change notifications, and the repository seams that
//! let the coordinator and matcher run against any persistence layer.

pub mod count_cache;
pub mod defaults;
pub mod error;
pub mod events;
pub mod hashing;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use count_cache::{ActiveCountCache, AnchorMap};
pub use error::{Error, Result};
pub use events::{EventBus, EventEnvelope, LinkEvent, RunOutcome};
pub use hashing::content_hash;
pub use models::*;
pub use traits::*;
