//! Content fingerprinting for embedding staleness detection.
//!
//! An embedding row is *current* iff its stored hash matches the live
//! content's hash. This is how the pipeline decides whether re-embedding
//! is needed without calling the provider.

use sha2::{Digest, Sha256};

/// SHA-256 hex fingerprint over an item's title and body.
///
/// The title and body are length-prefixed before hashing so that moving
/// text across the title/body boundary changes the fingerprint.
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((title.len() as u64).to_le_bytes());
    hasher.update(title.as_bytes());
    hasher.update((body.len() as u64).to_le_bytes());
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}
