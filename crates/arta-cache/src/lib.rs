//! Three-tier TTL response cache.
//!
//! Tiers hold generic reply text, per-user profile snapshots, and tax
//! computation results, each with its own TTL and capacity. Keys are sha256
//! digests of the scope and normalized query text, so logs never carry
//! plaintext queries; only a short key prefix is ever logged.

mod keys;
mod tiers;

pub use keys::{derive_cache_key, key_preview, normalize_query_text};
pub use tiers::{
    CacheConfig, CacheStats, CacheTier, ResponseCache, TierConfig, UserProfileSnapshot,
};
