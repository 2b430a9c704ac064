//! Content fingerprinting and change detection.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub fingerprint: String,
    pub changed: bool,
}

/// SHA-256 hex of the UTF-8 bytes of `content`.
pub fn fingerprint(content: &str) -> String {
    let mut h = Sha256::new();
    h.update(content.as_bytes());
    format!("{:x}", h.finalize())
}

/// Fingerprint `content` and compare it against the last recorded fingerprint.
///
/// An empty `previous` never matches, so the first observation always
/// counts as a change and establishes the baseline.
pub fn detect(content: &str, previous: &str) -> Detection {
    let fingerprint = fingerprint(content);
    let changed = fingerprint != previous;
    Detection {
        fingerprint,
        changed,
    }
}
