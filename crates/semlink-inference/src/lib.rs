//! # semlink-inference
//!
//! Embedding provider abstraction for semlink.
//!
//! Provides the Ollama backend used in production and a deterministic mock
//! backend for tests. Both implement
//! [`semlink_core::EmbeddingBackend`].

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(feature = "mock", test))]
pub mod mock;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(any(feature = "mock", test))]
pub use mock::{MockEmbeddingBackend, MockEmbeddingGenerator};

pub use semlink_core::{EmbeddingBackend, Error, Result, Vector};
