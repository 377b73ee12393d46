// src/fingerprint.rs
use sha2::{Digest, Sha256};

use crate::model::PageSnapshot;

/// Stable content hash of a page's title and body (lowercase hex SHA-256).
///
/// A unit separator sits between the fields so that moving text from the
/// title into the body still changes the digest.
pub fn fingerprint(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Fingerprint an extraction, refusing empty ones.
///
/// Returns `None` when both title and body are blank so a failed fetch can
/// never overwrite the last recorded hash.
pub fn fingerprint_snapshot(snap: &PageSnapshot) -> Option<String> {
    if snap.title.trim().is_empty() && snap.body.trim().is_empty() {
        return None;
    }
    Some(fingerprint(&snap.title, &snap.body))
}
