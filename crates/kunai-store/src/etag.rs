//! `ETag` generation.

use sha2::{Digest, Sha256};

/// ## Summary
/// Generates an `ETag` from canonical bytes using SHA-256. The returned
/// value is the bare hex digest; HTTP emission adds the surrounding
/// quotes.
#[must_use]
pub fn generate_etag(canonical_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_yields_identical_etag() {
        assert_eq!(generate_etag(b"abc"), generate_etag(b"abc"));
        assert_ne!(generate_etag(b"abc"), generate_etag(b"abd"));
    }
}
