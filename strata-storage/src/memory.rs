//! In-memory backends.
//!
//! `MemoryPersistentStore` and `MemoryEphemeralCache` model the quota and
//! size limits of the hosted services they stand in for, so that tests see
//! the same failures production would. `MemoryProvider` hands out one pair
//! per scope.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use strata_core::{
    CacheError, CacheResult, Clock, Scope, StorageError, StorageResult, SystemClock,
    MAX_CACHE_TTL,
};

use crate::traits::{EphemeralCache, PersistentStore, StoreProvider};

// ============================================================================
// PERSISTENT STORE
// ============================================================================

/// Size limits for a persistent store. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreLimits {
    /// Longest key, in bytes.
    pub max_key_bytes: Option<usize>,
    /// Largest single value, in bytes.
    pub max_value_bytes: Option<usize>,
    /// Sum of all key and value bytes.
    pub max_total_bytes: Option<usize>,
}

impl StoreLimits {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limits of the hosted properties service: 9 KB per value, 500 KB per store.
    pub fn hosted() -> Self {
        Self {
            max_key_bytes: None,
            max_value_bytes: Some(9 * 1024),
            max_total_bytes: Some(500 * 1024),
        }
    }

    /// Check a single key/value pair against the per-entry limits.
    pub fn check_entry(&self, key: &str, value: &str) -> StorageResult<()> {
        if let Some(max) = self.max_key_bytes {
            if key.len() > max {
                return Err(StorageError::KeyTooLong {
                    len: key.len(),
                    max,
                });
            }
        }
        if let Some(max) = self.max_value_bytes {
            if value.len() > max {
                return Err(StorageError::ValueTooLarge {
                    key: key.to_string(),
                    len: value.len(),
                    max,
                });
            }
        }
        Ok(())
    }
}

/// In-memory persistent store for one scope.
#[derive(Debug, Default)]
pub struct MemoryPersistentStore {
    entries: RwLock<BTreeMap<String, String>>,
    limits: StoreLimits,
}

impl MemoryPersistentStore {
    /// Create an unlimited store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that enforces `limits`.
    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            limits,
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .map(|e| e.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }
}

impl PersistentStore for MemoryPersistentStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.limits.check_entry(key, value)?;

        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(limit) = self.limits.max_total_bytes {
            let current: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
            let replaced = entries.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
            let used = current - replaced + key.len() + value.len();
            if used > limit {
                return Err(StorageError::QuotaExceeded { used, limit });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    fn entries(&self) -> StorageResult<Vec<(String, String)>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ============================================================================
// EPHEMERAL CACHE
// ============================================================================

/// Limits of an ephemeral cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Longest key, in bytes.
    pub max_key_bytes: usize,
    /// Largest value, in bytes.
    pub max_value_bytes: usize,
    /// Requested TTLs are clamped to this.
    pub max_ttl: Duration,
}

impl Default for CacheLimits {
    /// Limits of the hosted cache service: 250-byte keys, 100 KB values, 6 h TTL.
    fn default() -> Self {
        Self {
            max_key_bytes: 250,
            max_value_bytes: 100 * 1024,
            max_ttl: MAX_CACHE_TTL,
        }
    }
}

impl CacheLimits {
    /// Check a key/value pair.
    pub fn check_entry(&self, key: &str, value: &str) -> CacheResult<()> {
        if key.len() > self.max_key_bytes {
            return Err(CacheError::KeyTooLong {
                len: key.len(),
                max: self.max_key_bytes,
            });
        }
        if value.len() > self.max_value_bytes {
            return Err(CacheError::ValueTooLarge {
                len: value.len(),
                max: self.max_value_bytes,
            });
        }
        Ok(())
    }

    /// Expiry instant for a put at `now`, with the TTL clamped to `max_ttl`.
    pub fn expires_at(&self, now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        let ttl = ttl.min(self.max_ttl);
        let delta = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory TTL cache for one scope.
///
/// Expired entries are dropped lazily on `get`, or in bulk by
/// [`purge_expired`](Self::purge_expired).
pub struct MemoryEphemeralCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    limits: CacheLimits,
}

impl Default for MemoryEphemeralCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryEphemeralCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEphemeralCache")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl MemoryEphemeralCache {
    /// Create a cache on the wall clock with hosted-service limits.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            limits: CacheLimits::default(),
        }
    }

    /// Replace the limits.
    pub fn with_limits(mut self, limits: CacheLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .map(|e| e.values().filter(|entry| entry.expires_at > now).count())
            .unwrap_or(0)
    }

    /// True when no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    /// Drop everything.
    pub fn clear(&self) -> CacheResult<()> {
        self.entries.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

fn poisoned() -> CacheError {
    CacheError::Unavailable {
        reason: "cache lock poisoned".to_string(),
    }
}

impl EphemeralCache for MemoryEphemeralCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it unless a concurrent put refreshed it meanwhile.
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.limits.check_entry(key, value)?;
        let expires_at = self.limits.expires_at(self.clock.now(), ttl);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// PROVIDER
// ============================================================================

/// Hands out one in-memory store and one in-memory cache per scope.
///
/// Backends are created on first request and then reused, so every settings
/// instance bound to the same scope sees the same data.
pub struct MemoryProvider {
    stores: Mutex<HashMap<Scope, Arc<MemoryPersistentStore>>>,
    caches: Mutex<HashMap<Scope, Arc<MemoryEphemeralCache>>>,
    clock: Arc<dyn Clock>,
    store_limits: StoreLimits,
    cache_limits: CacheLimits,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// Unlimited stores, hosted-limit caches, wall clock.
    pub fn new() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            caches: Mutex::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            store_limits: StoreLimits::unlimited(),
            cache_limits: CacheLimits::default(),
        }
    }

    /// Drive cache expiry from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Limits for every store this provider creates.
    pub fn with_store_limits(mut self, limits: StoreLimits) -> Self {
        self.store_limits = limits;
        self
    }

    /// Limits for every cache this provider creates.
    pub fn with_cache_limits(mut self, limits: CacheLimits) -> Self {
        self.cache_limits = limits;
        self
    }
}

impl StoreProvider for MemoryProvider {
    type Store = MemoryPersistentStore;
    type Cache = MemoryEphemeralCache;

    fn persistent_store(&self, scope: Scope) -> StorageResult<Arc<MemoryPersistentStore>> {
        let mut stores = self.stores.lock().map_err(|_| StorageError::LockPoisoned)?;
        let store = stores
            .entry(scope)
            .or_insert_with(|| Arc::new(MemoryPersistentStore::with_limits(self.store_limits)));
        Ok(Arc::clone(store))
    }

    fn ephemeral_cache(&self, scope: Scope) -> CacheResult<Arc<MemoryEphemeralCache>> {
        let mut caches = self.caches.lock().map_err(|_| poisoned())?;
        let cache = caches.entry(scope).or_insert_with(|| {
            Arc::new(
                MemoryEphemeralCache::with_clock(Arc::clone(&self.clock))
                    .with_limits(self.cache_limits),
            )
        });
        Ok(Arc::clone(cache))
    }
}

// ============================================================================
// TESTS
// ============================================================================
