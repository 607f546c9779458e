//! Error types for semlink.

use thiserror::Error;

/// Result type alias using semlink's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for semlink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Link not found
    #[error("Link not found: {0}")]
    LinkNotFound(uuid::Uuid),

    /// A dedup invariant would be violated; no state was mutated.
    /// The message names which gate fired.
    #[error("Duplicate link rejected: {0}")]
    DuplicateLink(String),

    /// Invalid input shape; no state was mutated
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding provider call failed (timeout, malformed response).
    /// Recorded per item; never aborts a batch run.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Store write failed after a destructive step (e.g. the insert half
    /// of a delete-then-insert upsert). Distinct from "no rows affected":
    /// this variant indicates data loss risk and is fatal to the run.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operation attempted in a state that forbids it
    #[error("State error: {0}")]
    State(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
