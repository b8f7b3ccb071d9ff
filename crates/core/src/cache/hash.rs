//! Request-derived cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// Entries are GET-only, so callers pass the method mostly to keep keys of
/// other methods from ever colliding with cached ones. The URL is expected to
/// be canonical already (fragment stripped, host lowercased).
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
