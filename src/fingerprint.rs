//! Content fingerprints for example sentences.
//!
//! A sentence's id is the SHA-256 of its literal text, hex-encoded. The same
//! text always maps to the same id across runs, which is what lets a prior
//! snapshot's sentence embeddings be matched by id alone.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `text`.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
