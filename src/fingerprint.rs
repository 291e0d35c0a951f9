//! Content fingerprinting for change detection.
//!
//! The monitored dashboard text is reduced to a SHA-256 hex digest. Hash
//! equality is the only change signal at this layer: any byte-level difference
//! in the text flips the fingerprint.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Fingerprint monitored text.
pub fn fingerprint(text: &str) -> String {
    sha256_hex(text.as_bytes())
}

/// Whether a freshly computed fingerprint differs from the stored one.
///
/// An empty previous hash (first run) always counts as a change.
pub fn has_changed(new_hash: &str, old_hash: &str) -> bool {
    new_hash != old_hash
}

/// Strip all whitespace, including line breaks and ideographic spaces.
///
/// Used to compare OCR output across runs, where layout jitter in the
/// extracted text should not count as a content change.
pub fn normalize_text(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Compare two texts ignoring whitespace and line breaks.
pub fn same_normalized(a: &str, b: &str) -> bool {
    normalize_text(a) == normalize_text(b)
}
