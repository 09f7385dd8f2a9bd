use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use arta_core::{current_unix_timestamp_ms, is_expired_unix_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys::{derive_cache_key, key_preview};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Closed set of cache tiers, resolved to tier state at construction.
pub enum CacheTier {
    Response,
    UserProfile,
    TaxResult,
}

impl CacheTier {
    pub const ALL: [CacheTier; 3] = [
        CacheTier::Response,
        CacheTier::UserProfile,
        CacheTier::TaxResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Response => "response",
            Self::UserProfile => "user_profile",
            Self::TaxResult => "tax_result",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Per-tier tuning.
pub struct TierConfig {
    pub default_ttl_ms: u64,
    pub max_keys: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Tuning for all three tiers. Defaults mirror the volatility ordering:
/// generic replies age fastest, tax results slowest.
pub struct CacheConfig {
    pub response: TierConfig,
    pub user_profile: TierConfig,
    pub tax_result: TierConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            response: TierConfig {
                default_ttl_ms: 3_600_000,
                max_keys: 1_000,
            },
            user_profile: TierConfig {
                default_ttl_ms: 7_200_000,
                max_keys: 1_000,
            },
            tax_result: TierConfig {
                default_ttl_ms: 86_400_000,
                max_keys: 1_000,
            },
        }
    }
}

impl CacheConfig {
    fn tier(&self, tier: CacheTier) -> TierConfig {
        match tier {
            CacheTier::Response => self.response,
            CacheTier::UserProfile => self.user_profile,
            CacheTier::TaxResult => self.tax_result,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Per-tier observability counters.
pub struct CacheStats {
    pub key_count: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted_at_ms: u64,
    expires_at_ms: u64,
    last_touched_ms: u64,
}

#[derive(Default)]
struct TierInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

struct TierState {
    tier: CacheTier,
    config: TierConfig,
    inner: Mutex<TierInner>,
}

impl TierState {
    fn new(tier: CacheTier, config: TierConfig) -> Self {
        Self {
            tier,
            config,
            inner: Mutex::new(TierInner::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TierInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("{} cache tier mutex is poisoned", self.tier.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Profile snapshot kept in the user-profile tier. A write fully replaces
/// the previous snapshot; there is no field-by-field merge.
pub struct UserProfileSnapshot {
    pub user_id: String,
    pub message_count: u64,
    pub first_interaction_unix_ms: u64,
    pub last_message_unix_ms: u64,
    #[serde(default)]
    pub last_seen_unix_ms: u64,
}

/// Three independent TTL-bounded key-value stores.
pub struct ResponseCache {
    response: TierState,
    user_profile: TierState,
    tax_result: TierState,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            response: TierState::new(CacheTier::Response, config.tier(CacheTier::Response)),
            user_profile: TierState::new(
                CacheTier::UserProfile,
                config.tier(CacheTier::UserProfile),
            ),
            tax_result: TierState::new(CacheTier::TaxResult, config.tier(CacheTier::TaxResult)),
        }
    }

    fn state(&self, tier: CacheTier) -> &TierState {
        match tier {
            CacheTier::Response => &self.response,
            CacheTier::UserProfile => &self.user_profile,
            CacheTier::TaxResult => &self.tax_result,
        }
    }

    /// Looks a key up; an entry past its expiry behaves as a miss and is
    /// dropped in place.
    pub fn get(&self, tier: CacheTier, key: &str) -> Result<Option<Value>> {
        self.get_at(tier, key, current_unix_timestamp_ms())
    }

    pub fn get_at(&self, tier: CacheTier, key: &str, now_unix_ms: u64) -> Result<Option<Value>> {
        let state = self.state(tier);
        let mut inner = state.lock()?;

        let expired = inner
            .entries
            .get(key)
            .map(|entry| is_expired_unix_ms(entry.expires_at_ms, now_unix_ms))
            .unwrap_or(false);
        if expired {
            let _ = inner.entries.remove(key);
        }

        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.last_touched_ms = now_unix_ms;
                let value = entry.value.clone();
                inner.hits = inner.hits.saturating_add(1);
                tracing::debug!(tier = tier.as_str(), key = %key_preview(key), "cache hit");
                Ok(Some(value))
            }
            None => {
                inner.misses = inner.misses.saturating_add(1);
                tracing::debug!(tier = tier.as_str(), key = %key_preview(key), "cache miss");
                Ok(None)
            }
        }
    }

    /// Inserts or overwrites a key. Insertion past the tier's capacity evicts
    /// the oldest-untouched entries rather than failing the write.
    pub fn set(
        &self,
        tier: CacheTier,
        key: &str,
        value: Value,
        ttl_ms: Option<u64>,
    ) -> Result<()> {
        self.set_at(tier, key, value, ttl_ms, current_unix_timestamp_ms())
    }

    pub fn set_at(
        &self,
        tier: CacheTier,
        key: &str,
        value: Value,
        ttl_ms: Option<u64>,
        now_unix_ms: u64,
    ) -> Result<()> {
        let state = self.state(tier);
        let ttl_ms = ttl_ms.unwrap_or(state.config.default_ttl_ms);
        let mut inner = state.lock()?;
        let _ = inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at_ms: now_unix_ms,
                expires_at_ms: now_unix_ms.saturating_add(ttl_ms),
                last_touched_ms: now_unix_ms,
            },
        );

        while inner.entries.len() > state.config.max_keys.max(1) {
            let oldest = inner
                .entries
                .iter()
                .filter(|(candidate, _)| candidate.as_str() != key)
                .min_by_key(|(_, entry)| (entry.last_touched_ms, entry.inserted_at_ms))
                .map(|(candidate, _)| candidate.clone());
            let Some(oldest) = oldest else {
                break;
            };
            let _ = inner.entries.remove(&oldest);
            tracing::debug!(
                tier = tier.as_str(),
                key = %key_preview(&oldest),
                "evicted least-recently-used cache entry"
            );
        }

        tracing::debug!(tier = tier.as_str(), key = %key_preview(key), ttl_ms, "cached value");
        Ok(())
    }

    /// Removes one key; reports whether it existed.
    pub fn delete(&self, tier: CacheTier, key: &str) -> Result<bool> {
        let state = self.state(tier);
        let mut inner = state.lock()?;
        let existed = inner.entries.remove(key).is_some();
        if existed {
            tracing::debug!(tier = tier.as_str(), key = %key_preview(key), "deleted cache entry");
        }
        Ok(existed)
    }

    /// Clears every entry in one tier. Counters survive the flush.
    pub fn clear(&self, tier: CacheTier) -> Result<()> {
        let state = self.state(tier);
        let mut inner = state.lock()?;
        inner.entries.clear();
        tracing::info!(tier = tier.as_str(), "cache tier cleared");
        Ok(())
    }

    /// Clears all three tiers.
    pub fn clear_all(&self) -> Result<()> {
        for tier in CacheTier::ALL {
            self.clear(tier)?;
        }
        Ok(())
    }

    pub fn stats(&self, tier: CacheTier) -> Result<CacheStats> {
        let state = self.state(tier);
        let inner = state.lock()?;
        let lookups = inner.hits.saturating_add(inner.misses);
        let hit_rate = if lookups > 0 {
            inner.hits as f64 / lookups as f64
        } else {
            0.0
        };
        Ok(CacheStats {
            key_count: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
        })
    }

    /// Writes a user-profile snapshot, stamping `last_seen`. The write fully
    /// replaces any previous snapshot for the user.
    pub fn cache_user_info(&self, user_id: &str, mut profile: UserProfileSnapshot) -> Result<()> {
        self.cache_user_info_at(user_id, &mut profile, current_unix_timestamp_ms())
    }

    pub fn cache_user_info_at(
        &self,
        user_id: &str,
        profile: &mut UserProfileSnapshot,
        now_unix_ms: u64,
    ) -> Result<()> {
        profile.last_seen_unix_ms = now_unix_ms;
        let key = user_profile_key(user_id);
        let value = serde_json::to_value(&*profile)?;
        self.set_at(CacheTier::UserProfile, &key, value, None, now_unix_ms)
    }

    pub fn cached_user_info(&self, user_id: &str) -> Result<Option<UserProfileSnapshot>> {
        self.cached_user_info_at(user_id, current_unix_timestamp_ms())
    }

    pub fn cached_user_info_at(
        &self,
        user_id: &str,
        now_unix_ms: u64,
    ) -> Result<Option<UserProfileSnapshot>> {
        let key = user_profile_key(user_id);
        match self.get_at(CacheTier::UserProfile, &key, now_unix_ms)? {
            Some(value) => Ok(serde_json::from_value(value).ok()),
            None => Ok(None),
        }
    }

    /// Caches a tax computation keyed by user and income amount.
    pub fn cache_tax_result(&self, user_id: &str, income: u64, result: Value) -> Result<()> {
        let key = tax_result_key(user_id, income);
        self.set(CacheTier::TaxResult, &key, result, None)
    }

    pub fn cached_tax_result(&self, user_id: &str, income: u64) -> Result<Option<Value>> {
        let key = tax_result_key(user_id, income);
        self.get(CacheTier::TaxResult, &key)
    }
}

fn user_profile_key(user_id: &str) -> String {
    derive_cache_key(user_id, "user_info", CacheTier::UserProfile)
}

fn tax_result_key(user_id: &str, income: u64) -> String {
    derive_cache_key(user_id, &format!("tax_calc_{income}"), CacheTier::TaxResult)
}
