//! Backend traits consumed by the tiered store.
//!
//! Both backends are keyed by plain strings and hold plain string values.
//! Encoding structured values is the caller's job.

use std::sync::Arc;
use std::time::Duration;

use strata_core::{CacheResult, Scope, StorageResult};

/// Durable, quota-limited key-value store for one scope. Source of truth.
///
/// Entries have no TTL; they live until deleted. Writes may fail on quota or
/// size limits.
pub trait PersistentStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Set a key-value pair, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// All keys in this scope, sorted.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// All key-value pairs in this scope, sorted by key.
    fn entries(&self) -> StorageResult<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }
}

/// Fast, short-lived cache for one scope. Never authoritative.
///
/// Every put carries a TTL; entries vanish silently after it elapses or on
/// eviction. Every call may fail transiently.
pub trait EphemeralCache: Send + Sync {
    /// Get a cached value, or None on miss or expiry.
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Cache a value for at most `ttl`.
    fn put(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Drop a cached value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> CacheResult<()>;
}

/// Resolves the store and cache bound to a scope.
///
/// This stands in for the platform services that own the real backends. A
/// provider must hand out the same backend for the same scope every time so
/// that separate settings instances share data.
pub trait StoreProvider: Send + Sync {
    type Store: PersistentStore + ?Sized;
    type Cache: EphemeralCache + ?Sized;

    /// Durable store for a scope.
    fn persistent_store(&self, scope: Scope) -> StorageResult<Arc<Self::Store>>;

    /// Cache for a scope.
    fn ephemeral_cache(&self, scope: Scope) -> CacheResult<Arc<Self::Cache>>;
}

impl<T: PersistentStore + ?Sized> PersistentStore for Arc<T> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        (**self).keys()
    }

    fn entries(&self) -> StorageResult<Vec<(String, String)>> {
        (**self).entries()
    }
}

impl<T: EphemeralCache + ?Sized> EphemeralCache for Arc<T> {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        (**self).put(key, value, ttl)
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        (**self).remove(key)
    }
}

impl<P: StoreProvider + ?Sized> StoreProvider for Arc<P> {
    type Store = P::Store;
    type Cache = P::Cache;

    fn persistent_store(&self, scope: Scope) -> StorageResult<Arc<Self::Store>> {
        (**self).persistent_store(scope)
    }

    fn ephemeral_cache(&self, scope: Scope) -> CacheResult<Arc<Self::Cache>> {
        (**self).ephemeral_cache(scope)
    }
}
