//! Cache contract.
//!
//! The loader treats its cache as an external key-value store holding opaque
//! strings. Anything that can get, set with an expiry, and delete by exact
//! key can sit behind [`KeyValueCache`]: an in-process map, Redis, memcached.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Options for [`KeyValueCache::set`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Lifetime of the entry. `None` keeps it until deleted or evicted.
    pub ttl: Option<Duration>,
}

impl SetOptions {
    /// Expire after `secs` seconds.
    pub fn ttl_secs(secs: u64) -> Self {
        Self {
            ttl: Some(Duration::from_secs(secs)),
        }
    }
}

/// External key-value cache.
///
/// Implementations must be safe to share between tasks. Values are opaque
/// to the cache; keys are compared exactly (no prefix or wildcard
/// semantics are assumed by callers).
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Fetch the value stored under `key`, if present and not expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String, options: SetOptions) -> CacheResult<()>;

    /// Remove `key`. Returns `true` if an entry was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;
}

/// Counters describing cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries dropped to make room for new ones.
    pub evictions: u64,
    /// Entries found expired on access or during eviction.
    pub expirations: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
