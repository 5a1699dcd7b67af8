//! Payload digests for duplicate suppression
//!
//! A row's identity within one file run is the endpoint it targets plus the
//! exact serialized document it produced.

use sha2::{Digest, Sha256};

/// Compute the duplicate-suppression digest for a document bound for `endpoint`
pub fn payload_digest(endpoint: &str, document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"Endpoint: ");
    hasher.update(endpoint.as_bytes());
    hasher.update(b"\n");
    hasher.update(document.as_bytes());
    hasher.update(b"\n");

    hex::encode(hasher.finalize())
}

/// Compute a SHA-256 hex digest of arbitrary bytes
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
