//! DC-006: BLAKE3 fingerprints of declaration records.
//!
//! The fingerprint hashes the canonical rendering, so two files that differ
//! only in layout or comments share one fingerprint.

use super::render::render;
use super::types::DeclarationRecord;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Fingerprint a record via its canonical rendering.
pub fn fingerprint(record: &DeclarationRecord) -> String {
    hash_string(&render(record))
}
