use sha2::{Digest, Sha256};

use crate::tiers::CacheTier;

/// Collapses whitespace and case so trivially different phrasings of the
/// same query share a cache key.
pub fn normalize_query_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Derives a tier-prefixed digest key from a scope (user or thread id) and
/// the normalized query text. The digest keeps plaintext out of the key.
pub fn derive_cache_key(scope: &str, text: &str, tier: CacheTier) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b"_");
    hasher.update(normalize_query_text(text).as_bytes());
    hasher.update(b"_");
    hasher.update(tier.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut encoded = String::with_capacity(digest.len() * 2);
    for byte in digest {
        encoded.push_str(&format!("{byte:02x}"));
    }
    format!("{}_{}", tier.as_str(), encoded)
}

/// Short key prefix safe to include in log lines.
pub fn key_preview(key: &str) -> String {
    let mut preview = key.chars().take(18).collect::<String>();
    if key.chars().count() > 18 {
        preview.push_str("...");
    }
    preview
}
