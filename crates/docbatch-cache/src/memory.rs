use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::trace;

use crate::error::CacheResult;
use crate::traits::{CacheStats, KeyValueCache, SetOptions};

/// Configuration for [`InMemoryCache`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Maximum number of live entries. When full, expired entries are
    /// dropped first, then the oldest insertion.
    pub max_entries: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
    inserted: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_insert: u64,
    stats: CacheStats,
}

impl Inner {
    fn purge_expired(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        self.stats.expirations += (before - self.entries.len()) as u64;
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.inserted)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

/// In-process key-value cache with per-entry TTL.
///
/// Expiry uses `tokio::time::Instant`, so tests can drive it with a paused
/// clock. Intended for single-process deployments and tests.
pub struct InMemoryCache {
    inner: Mutex<Inner>,
    config: MemoryCacheConfig,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_config(MemoryCacheConfig::default())
    }

    pub fn with_config(config: MemoryCacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Number of stored entries, expired ones not yet purged included.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of usage counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("lock poisoned");
        CacheStats {
            entry_count: inner.entries.len() as u64,
            ..inner.stats.clone()
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().expect("lock poisoned").entries.clear();
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lock poisoned");
        let found = inner
            .entries
            .get(key)
            .map(|entry| (entry.is_expired(now), entry.value.clone()));
        if let Some((false, value)) = found {
            inner.stats.hits += 1;
            return Ok(Some(value));
        }
        if found.is_some() {
            inner.entries.remove(key);
            inner.stats.expirations += 1;
            trace!(key, "entry expired");
        }
        inner.stats.misses += 1;
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, options: SetOptions) -> CacheResult<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lock poisoned");

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.config.max_entries {
            inner.purge_expired(now);
            while inner.entries.len() >= self.config.max_entries.max(1) {
                inner.evict_oldest();
            }
        }

        let inserted = inner.next_insert;
        inner.next_insert += 1;
        inner.stats.sets += 1;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: options.ttl.map(|ttl| now + ttl),
                inserted,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.stats.deletes += 1;
        Ok(inner.entries.remove(key).is_some())
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entry_count", &self.len())
            .field("max_entries", &self.config.max_entries)
            .finish()
    }
}
