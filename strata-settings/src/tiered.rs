//! Three-tier read path over one scope.
//!
//! Reads try the instance-local hot buffer, then the shared ephemeral cache,
//! then the persistent store. A store hit is written back to the cache.
//! Writes go to the store first; the hot buffer and cache follow only once
//! the store has accepted the value.
//!
//! The cache is best-effort throughout: its failures are logged and counted,
//! never returned. Store failures always propagate.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use once_cell::unsync::OnceCell;
use strata_core::{CacheError, Scope, SettingsResult};
use strata_storage::{EphemeralCache, PersistentStore, StoreProvider};

/// Read and failure counters for one tiered store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Reads answered by the hot buffer.
    pub hot_hits: u64,
    /// Reads answered by the ephemeral cache.
    pub cache_hits: u64,
    /// Reads answered by the persistent store.
    pub store_hits: u64,
    /// Reads that found nothing anywhere.
    pub misses: u64,
    /// Store hits written back to the cache.
    pub repopulations: u64,
    /// Cache calls (including binding) that failed and were skipped.
    pub cache_failures: u64,
}

impl TierStats {
    /// Total reads served.
    pub fn reads(&self) -> u64 {
        self.hot_hits + self.cache_hits + self.store_hits + self.misses
    }

    /// Fraction of reads that never reached the persistent store.
    pub fn hit_rate(&self) -> f64 {
        let reads = self.reads();
        if reads == 0 {
            0.0
        } else {
            (self.hot_hits + self.cache_hits) as f64 / reads as f64
        }
    }
}

/// Tiered store for a single scope.
///
/// Backend handles are bound on first use. A failed cache binding is not
/// remembered, so the next access tries again.
pub struct TieredStore<P: StoreProvider> {
    scope: Scope,
    provider: Arc<P>,
    ttl: Duration,
    store: OnceCell<Arc<P::Store>>,
    cache: OnceCell<Arc<P::Cache>>,
    hot_buffer: HashMap<String, String>,
    stats: Cell<TierStats>,
}

impl<P: StoreProvider> std::fmt::Debug for TieredStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore")
            .field("scope", &self.scope)
            .field("ttl", &self.ttl)
            .field("store_bound", &self.store.get().is_some())
            .field("cache_bound", &self.cache.get().is_some())
            .field("buffered", &self.hot_buffer.len())
            .field("stats", &self.stats.get())
            .finish()
    }
}

impl<P: StoreProvider> TieredStore<P> {
    /// Create a tiered store. Nothing is bound until the first operation.
    pub fn new(provider: Arc<P>, scope: Scope, ttl: Duration) -> Self {
        Self {
            scope,
            provider,
            ttl,
            store: OnceCell::new(),
            cache: OnceCell::new(),
            hot_buffer: HashMap::new(),
            stats: Cell::new(TierStats::default()),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// TTL used for every cache put.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> TierStats {
        self.stats.get()
    }

    /// Whether `key` was written through this instance and is still buffered.
    pub fn is_buffered(&self, key: &str) -> bool {
        self.hot_buffer.contains_key(key)
    }

    pub fn buffered_len(&self) -> usize {
        self.hot_buffer.len()
    }

    /// Read the stored string for `key`.
    pub fn read(&self, key: &str) -> SettingsResult<Option<String>> {
        if let Some(raw) = self.hot_buffer.get(key) {
            self.record(|s| s.hot_hits += 1);
            return Ok(Some(raw.clone()));
        }

        if let Some(cache) = self.cache() {
            match cache.get(key) {
                Ok(Some(raw)) => {
                    self.record(|s| s.cache_hits += 1);
                    return Ok(Some(raw));
                }
                Ok(None) => {}
                Err(e) => self.cache_failed("get", key, &e),
            }
        }

        match self.store()?.get(key)? {
            Some(raw) => {
                self.record(|s| s.store_hits += 1);
                if self.cache_put(key, &raw) {
                    self.record(|s| s.repopulations += 1);
                }
                Ok(Some(raw))
            }
            None => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
        }
    }

    /// Write through: store first, then hot buffer, then cache.
    ///
    /// If the store rejects the value nothing else changes. If the cache
    /// rejects it, the key is evicted so no older cached value outlives the
    /// write.
    pub fn write(&mut self, key: &str, raw: String) -> SettingsResult<()> {
        self.store()?.set(key, &raw)?;
        self.hot_buffer.insert(key.to_string(), raw.clone());
        if !self.cache_put(key, &raw) {
            self.cache_remove(key);
        }
        Ok(())
    }

    /// Remove `key` from every tier. Only a store failure is reported.
    pub fn delete(&mut self, key: &str) -> SettingsResult<()> {
        self.hot_buffer.remove(key);
        self.store()?.delete(key)?;
        self.cache_remove(key);
        Ok(())
    }

    /// Keys in the store plus any buffered by this instance, sorted.
    pub fn keys(&self) -> SettingsResult<Vec<String>> {
        let mut keys: BTreeSet<String> = self.store()?.keys()?.into_iter().collect();
        keys.extend(self.hot_buffer.keys().cloned());
        Ok(keys.into_iter().collect())
    }

    /// Every stored string, with buffered values taking precedence.
    pub fn entries(&self) -> SettingsResult<BTreeMap<String, String>> {
        let mut entries: BTreeMap<String, String> = self.store()?.entries()?.into_iter().collect();
        for (key, raw) in &self.hot_buffer {
            entries.insert(key.clone(), raw.clone());
        }
        Ok(entries)
    }

    fn store(&self) -> SettingsResult<&P::Store> {
        let store = self.store.get_or_try_init(|| {
            let store = self.provider.persistent_store(self.scope)?;
            tracing::debug!(scope = %self.scope, "Bound persistent store");
            Ok::<_, strata_core::StorageError>(store)
        })?;
        Ok(&**store)
    }

    fn cache(&self) -> Option<&P::Cache> {
        let bound = self.cache.get_or_try_init(|| {
            let cache = self.provider.ephemeral_cache(self.scope)?;
            tracing::debug!(scope = %self.scope, "Bound ephemeral cache");
            Ok::<_, CacheError>(cache)
        });
        match bound {
            Ok(cache) => Some(&**cache),
            Err(e) => {
                self.cache_failed("bind", "", &e);
                None
            }
        }
    }

    /// Best-effort put. Returns whether the cache accepted the value.
    fn cache_put(&self, key: &str, raw: &str) -> bool {
        let Some(cache) = self.cache() else {
            return false;
        };
        match cache.put(key, raw, self.ttl) {
            Ok(()) => true,
            Err(e) => {
                self.cache_failed("put", key, &e);
                false
            }
        }
    }

    /// Best-effort eviction.
    fn cache_remove(&self, key: &str) {
        if let Some(cache) = self.cache() {
            if let Err(e) = cache.remove(key) {
                self.cache_failed("remove", key, &e);
            }
        }
    }

    fn cache_failed(&self, op: &'static str, key: &str, error: &CacheError) {
        self.record(|s| s.cache_failures += 1);
        tracing::warn!(
            scope = %self.scope,
            op,
            key,
            error = %error,
            "Ephemeral cache call failed, continuing without it"
        );
    }

    fn record(&self, update: impl FnOnce(&mut TierStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ManualClock, SettingsError};
    use strata_test_utils::{fixtures, FakeProvider};

    const TTL: Duration = Duration::from_secs(21_600);

    fn tiered(provider: &Arc<FakeProvider>, scope: Scope) -> TieredStore<FakeProvider> {
        TieredStore::new(Arc::clone(provider), scope, TTL)
    }

    #[test]
    fn test_binding_is_lazy() {
        let provider = Arc::new(FakeProvider::new());
        let store = tiered(&provider, Scope::Script);
        assert_eq!(provider.store_bindings(), 0);
        assert_eq!(provider.cache_bindings(), 0);

        store.read("missing").unwrap();
        store.read("missing").unwrap();
        assert_eq!(provider.store_bindings(), 1);
        assert_eq!(provider.cache_bindings(), 1);
    }

    #[test]
    fn test_read_miss() {
        let provider = Arc::new(FakeProvider::new());
        let store = tiered(&provider, Scope::Script);
        assert_eq!(store.read("missing").unwrap(), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_hit_repopulates_cache() {
        let provider = Arc::new(FakeProvider::new());
        provider.store(Scope::Script).inner().set("k", "v").unwrap();

        let store = tiered(&provider, Scope::Script);
        assert_eq!(store.read("k").unwrap(), Some("v".to_string()));
        assert_eq!(
            provider.cache(Scope::Script).put_ttls(),
            vec![("k".to_string(), TTL)]
        );

        // Second read is served by the cache without touching the store.
        provider.store(Scope::Script).reset_calls();
        assert_eq!(store.read("k").unwrap(), Some("v".to_string()));
        assert_eq!(provider.store(Scope::Script).calls().gets, 0);

        let stats = store.stats();
        assert_eq!(stats.store_hits, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.repopulations, 1);
    }

    #[test]
    fn test_hot_buffer_serves_own_writes() {
        let provider = Arc::new(FakeProvider::new());
        let mut store = tiered(&provider, Scope::User);
        store.write("k", "v".to_string()).unwrap();
        assert!(store.is_buffered("k"));

        let cache = provider.cache(Scope::User);
        cache.reset_calls();
        assert_eq!(store.read("k").unwrap(), Some("v".to_string()));
        assert_eq!(cache.calls().gets, 0);
        assert_eq!(store.stats().hot_hits, 1);
    }

    #[test]
    fn test_write_goes_to_every_tier() {
        let provider = Arc::new(FakeProvider::new());
        let mut store = tiered(&provider, Scope::Document);
        store.write("k", "v".to_string()).unwrap();

        assert_eq!(
            provider.store(Scope::Document).inner().get("k").unwrap(),
            Some("v".to_string())
        );
        assert_eq!(
            provider.cache(Scope::Document).inner().get("k").unwrap(),
            Some("v".to_string())
        );
    }

    #[test]
    fn test_store_write_failure_leaves_other_tiers_untouched() {
        let provider = Arc::new(FakeProvider::new());
        let mut store = tiered(&provider, Scope::Script);
        store.write("k", "old".to_string()).unwrap();

        provider.store(Scope::Script).fail_writes(true);
        let result = store.write("k", "new".to_string());
        assert!(matches!(result, Err(SettingsError::Storage(_))));

        assert_eq!(store.read("k").unwrap(), Some("old".to_string()));
        assert_eq!(
            provider.cache(Scope::Script).inner().get("k").unwrap(),
            Some("old".to_string())
        );
    }

    #[test]
    fn test_cache_failures_are_absorbed() {
        let provider = Arc::new(FakeProvider::new());
        provider.store(Scope::Script).inner().set("k", "v").unwrap();
        provider.cache(Scope::Script).set_failing(true);

        let mut store = tiered(&provider, Scope::Script);
        assert_eq!(store.read("k").unwrap(), Some("v".to_string()));
        store.write("j", "w".to_string()).unwrap();
        store.delete("j").unwrap();

        let stats = store.stats();
        // read: get + repopulating put; write: put + eviction; delete: remove
        assert_eq!(stats.cache_failures, 5);
        assert_eq!(stats.repopulations, 0);
    }

    #[test]
    fn test_rejected_cache_put_evicts_older_value() {
        let provider = Arc::new(FakeProvider::new());
        let mut writer = tiered(&provider, Scope::Script);
        writer.write("blob", "small".to_string()).unwrap();

        // Over the cache's per-value limit, but the store takes it.
        let large = "x".repeat(200 * 1024);
        writer.write("blob", large.clone()).unwrap();
        assert_eq!(provider.cache(Scope::Script).inner().get("blob").unwrap(), None);
        assert_eq!(writer.stats().cache_failures, 1);

        let fresh = tiered(&provider, Scope::Script);
        assert_eq!(fresh.read("blob").unwrap(), Some(large));
        assert_eq!(fresh.stats().store_hits, 1);
    }

    #[test]
    fn test_cache_binding_failure_is_retried() {
        let provider = Arc::new(FakeProvider::new());
        provider.store(Scope::Script).inner().set("k", "v").unwrap();
        provider.fail_cache_binding(true);

        let store = tiered(&provider, Scope::Script);
        assert_eq!(store.read("k").unwrap(), Some("v".to_string()));
        let failed_bindings = provider.cache_bindings();
        assert!(failed_bindings >= 1);

        provider.fail_cache_binding(false);
        assert_eq!(store.read("k").unwrap(), Some("v".to_string()));
        assert_eq!(store.stats().repopulations, 1);
        assert_eq!(
            provider.cache(Scope::Script).inner().get("k").unwrap(),
            Some("v".to_string())
        );
    }

    #[test]
    fn test_store_binding_failure_propagates() {
        let provider = Arc::new(FakeProvider::new());
        provider.fail_store_binding(true);
        let store = tiered(&provider, Scope::Script);
        assert!(matches!(store.read("k"), Err(SettingsError::Storage(_))));
    }

    #[test]
    fn test_store_read_failure_propagates() {
        let provider = Arc::new(FakeProvider::new());
        provider.store(Scope::Script).fail_reads(true);
        let store = tiered(&provider, Scope::Script);
        assert!(matches!(store.read("k"), Err(SettingsError::Storage(_))));
    }

    #[test]
    fn test_delete_clears_every_tier() {
        let provider = Arc::new(FakeProvider::new());
        let mut store = tiered(&provider, Scope::Script);
        store.write("k", "v".to_string()).unwrap();
        store.delete("k").unwrap();

        assert!(!store.is_buffered("k"));
        assert_eq!(provider.store(Scope::Script).inner().get("k").unwrap(), None);
        assert_eq!(provider.cache(Scope::Script).inner().get("k").unwrap(), None);
        assert_eq!(store.read("k").unwrap(), None);
    }

    #[test]
    fn test_delete_store_failure_propagates() {
        let provider = Arc::new(FakeProvider::new());
        let mut store = tiered(&provider, Scope::Script);
        store.write("k", "v".to_string()).unwrap();
        provider.store(Scope::Script).fail_deletes(true);
        assert!(matches!(store.delete("k"), Err(SettingsError::Storage(_))));
    }

    #[test]
    fn test_cache_expiry_falls_through_to_store() {
        let clock = Arc::new(ManualClock::starting_now());
        let provider = fixtures::provider_with_clock(&clock);
        provider.store(Scope::Script).inner().set("k", "v").unwrap();

        let store = TieredStore::new(Arc::clone(&provider), Scope::Script, Duration::from_secs(60));
        store.read("k").unwrap();
        store.read("k").unwrap();
        assert_eq!(store.stats().cache_hits, 1);

        clock.advance(Duration::from_secs(61));
        store.read("k").unwrap();
        assert_eq!(store.stats().store_hits, 2);
    }

    #[test]
    fn test_instances_share_store_but_not_hot_buffer() {
        let provider = Arc::new(FakeProvider::new());
        let mut a = tiered(&provider, Scope::Script);
        let b = tiered(&provider, Scope::Script);

        a.write("k", "v".to_string()).unwrap();
        assert!(!b.is_buffered("k"));
        assert_eq!(b.read("k").unwrap(), Some("v".to_string()));
        assert_eq!(b.stats().cache_hits, 1);
    }

    #[test]
    fn test_scopes_are_isolated() {
        let provider = Arc::new(FakeProvider::new());
        let mut script = tiered(&provider, Scope::Script);
        let user = tiered(&provider, Scope::User);
        script.write("k", "v".to_string()).unwrap();
        assert_eq!(user.read("k").unwrap(), None);
    }

    #[test]
    fn test_keys_and_entries_include_buffered_values() {
        let provider = Arc::new(FakeProvider::new());
        provider.store(Scope::Script).inner().set("b", "1").unwrap();

        let mut store = tiered(&provider, Scope::Script);
        store.write("a", "2".to_string()).unwrap();
        // Another writer changes "a" behind this instance's back.
        provider.store(Scope::Script).inner().set("a", "3").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        let entries = store.entries().unwrap();
        assert_eq!(entries.get("a"), Some(&"2".to_string()));
        assert_eq!(entries.get("b"), Some(&"1".to_string()));
    }

    #[test]
    fn test_hit_rate() {
        let stats = TierStats {
            hot_hits: 1,
            cache_hits: 2,
            store_hits: 1,
            ..TierStats::default()
        };
        assert_eq!(stats.reads(), 4);
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(TierStats::default().hit_rate(), 0.0);
    }
}
