//! STRATA Test Utilities
//!
//! Shared test infrastructure for the STRATA workspace:
//! - Fault-injecting backends that count every call
//! - A provider handing those backends out per scope
//! - Proptest generators for keys, scopes and JSON values
//! - Fixtures and assertions for settings results

// Re-export in-memory backends from their source crate
pub use strata_storage::{
    CacheLimits, EphemeralCache, MemoryEphemeralCache, MemoryPersistentStore, MemoryProvider,
    PersistentStore, StoreLimits, StoreProvider,
};

// Re-export core types for convenience
pub use strata_core::{
    CacheError, CacheResult, Clock, ConfigError, EncodingError, ManualClock, Scope,
    SettingsConfig, SettingsError, SettingsResult, StorageError, StorageResult, SystemClock,
};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// FAULT-INJECTING BACKENDS
// ============================================================================

/// Per-operation call counts recorded by the fake backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub gets: usize,
    pub writes: usize,
    pub deletes: usize,
    pub lists: usize,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    lists: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> CallCounts {
        CallCounts {
            gets: self.gets.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            lists: self.lists.load(Ordering::SeqCst),
        }
    }

    fn reset(&self) {
        for counter in [&self.gets, &self.writes, &self.deletes, &self.lists] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

/// Persistent store that can be told to fail, wrapping an in-memory store.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryPersistentStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    counters: Counters,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            inner: MemoryPersistentStore::with_limits(limits),
            ..Self::default()
        }
    }

    /// Make `get`, `keys` and `entries` fail.
    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Make `set` fail.
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Make `delete` fail.
    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        self.counters.snapshot()
    }

    pub fn reset_calls(&self) {
        self.counters.reset();
    }

    /// The wrapped store, for seeding or inspecting data without counting.
    pub fn inner(&self) -> &MemoryPersistentStore {
        &self.inner
    }
}

impl PersistentStore for FaultyStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Counters::bump(&self.counters.gets);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        Counters::bump(&self.counters.writes);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        Counters::bump(&self.counters.deletes);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::DeleteFailed {
                key: key.to_string(),
                reason: "injected delete failure".to_string(),
            });
        }
        self.inner.delete(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Counters::bump(&self.counters.lists);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed {
                key: "*".to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        self.inner.keys()
    }
}

/// Ephemeral cache that can be told to fail, wrapping an in-memory cache.
///
/// Records the TTL of every successful put.
#[derive(Debug, Default)]
pub struct FlakyCache {
    inner: MemoryEphemeralCache,
    failing: AtomicBool,
    put_ttls: Mutex<Vec<(String, Duration)>>,
    counters: Counters,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: MemoryEphemeralCache::with_clock(clock),
            ..Self::default()
        }
    }

    /// Make every call fail with `CacheError::Unavailable`.
    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        self.counters.snapshot()
    }

    pub fn reset_calls(&self) {
        self.counters.reset();
    }

    /// `(key, ttl)` for every put that reached the inner cache, oldest first.
    pub fn put_ttls(&self) -> Vec<(String, Duration)> {
        self.put_ttls
            .lock()
            .map(|ttls| ttls.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn inner(&self) -> &MemoryEphemeralCache {
        &self.inner
    }

    fn check(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                reason: "injected cache failure".to_string(),
            });
        }
        Ok(())
    }
}

impl EphemeralCache for FlakyCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Counters::bump(&self.counters.gets);
        self.check()?;
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        Counters::bump(&self.counters.writes);
        self.check()?;
        self.inner.put(key, value, ttl)?;
        let mut ttls = self
            .put_ttls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ttls.push((key.to_string(), ttl));
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        Counters::bump(&self.counters.deletes);
        self.check()?;
        self.inner.remove(key)
    }
}

/// Hands out one `FaultyStore` and one `FlakyCache` per scope.
///
/// Binding itself can be made to fail, and every binding is counted.
#[derive(Debug)]
pub struct FakeProvider {
    stores: [Arc<FaultyStore>; 3],
    caches: [Arc<FlakyCache>; 3],
    fail_store_binding: AtomicBool,
    fail_cache_binding: AtomicBool,
    store_bindings: AtomicUsize,
    cache_bindings: AtomicUsize,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Caches expire entries against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            stores: Scope::ALL.map(|_| Arc::new(FaultyStore::new())),
            caches: Scope::ALL.map(|_| Arc::new(FlakyCache::with_clock(Arc::clone(&clock)))),
            fail_store_binding: AtomicBool::new(false),
            fail_cache_binding: AtomicBool::new(false),
            store_bindings: AtomicUsize::new(0),
            cache_bindings: AtomicUsize::new(0),
        }
    }

    pub fn store(&self, scope: Scope) -> Arc<FaultyStore> {
        Arc::clone(&self.stores[slot(scope)])
    }

    pub fn cache(&self, scope: Scope) -> Arc<FlakyCache> {
        Arc::clone(&self.caches[slot(scope)])
    }

    pub fn fail_store_binding(&self, on: bool) {
        self.fail_store_binding.store(on, Ordering::SeqCst);
    }

    pub fn fail_cache_binding(&self, on: bool) {
        self.fail_cache_binding.store(on, Ordering::SeqCst);
    }

    /// Number of `persistent_store` calls so far, failed ones included.
    pub fn store_bindings(&self) -> usize {
        self.store_bindings.load(Ordering::SeqCst)
    }

    /// Number of `ephemeral_cache` calls so far, failed ones included.
    pub fn cache_bindings(&self) -> usize {
        self.cache_bindings.load(Ordering::SeqCst)
    }
}

fn slot(scope: Scope) -> usize {
    match scope {
        Scope::Document => 0,
        Scope::Script => 1,
        Scope::User => 2,
    }
}

impl StoreProvider for FakeProvider {
    type Store = FaultyStore;
    type Cache = FlakyCache;

    fn persistent_store(&self, scope: Scope) -> StorageResult<Arc<FaultyStore>> {
        self.store_bindings.fetch_add(1, Ordering::SeqCst);
        if self.fail_store_binding.load(Ordering::SeqCst) {
            return Err(StorageError::TransactionFailed {
                reason: format!("{} store service unavailable", scope),
            });
        }
        Ok(self.store(scope))
    }

    fn ephemeral_cache(&self, scope: Scope) -> CacheResult<Arc<FlakyCache>> {
        self.cache_bindings.fetch_add(1, Ordering::SeqCst);
        if self.fail_cache_binding.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                reason: format!("{} cache service unavailable", scope),
            });
        }
        Ok(self.cache(scope))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for settings keys, scopes and values.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a Scope variant.
    pub fn arb_scope() -> impl Strategy<Value = Scope> {
        prop_oneof![
            Just(Scope::Document),
            Just(Scope::Script),
            Just(Scope::User),
        ]
    }

    /// Generate a non-empty property key.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9_.-]{0,23}".prop_map(|s| s)
    }

    /// Generate a plain string value, which may or may not parse as JSON.
    pub fn arb_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 @._:{}\\[\\]\"-]{0,32}".prop_map(|s| s)
    }

    /// Generate a JSON leaf. Floats carry at most two decimals so that they
    /// parse back to the same bits.
    pub fn arb_json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            (-1_000_000i64..1_000_000).prop_map(|cents| Value::from(cents as f64 / 100.0)),
            "[a-zA-Z0-9 @._-]{0,16}".prop_map(Value::String),
        ]
    }

    /// Generate a JSON value, nested at most four levels deep.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        arb_json_leaf().prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    /// Generate a small set of distinct properties.
    pub fn arb_properties() -> impl Strategy<Value = Vec<(String, Value)>> {
        prop::collection::btree_map(arb_key(), arb_json_value(), 0..8)
            .prop_map(|map| map.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built data for common settings scenarios.

    use super::*;
    use serde_json::{json, Value};

    /// A config with a short TTL, for expiry tests.
    pub fn short_ttl_config() -> SettingsConfig {
        SettingsConfig::new().with_ttl(Duration::from_secs(60))
    }

    /// A provider whose caches run on `clock`.
    pub fn provider_with_clock(clock: &Arc<ManualClock>) -> Arc<FakeProvider> {
        let clock: Arc<dyn Clock> = Arc::clone(clock) as Arc<dyn Clock>;
        Arc::new(FakeProvider::with_clock(clock))
    }

    /// A handful of properties of every value kind.
    pub fn sample_properties() -> Vec<(String, Value)> {
        vec![
            ("email".to_string(), json!("a@example.com")),
            ("config".to_string(), json!({"retries": 3})),
            ("enabled".to_string(), json!(true)),
            ("limit".to_string(), json!(25)),
            ("tags".to_string(), json!(["a", "b"])),
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over settings results.

    use super::*;

    /// Assert that a SettingsResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &SettingsResult<T>) {
        match result {
            Err(SettingsError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a SettingsResult is a missing key error.
    #[track_caller]
    pub fn assert_missing_key<T: std::fmt::Debug>(result: &SettingsResult<T>) {
        match result {
            Err(SettingsError::Config(ConfigError::MissingRequired { field })) => {
                assert_eq!(field, "key", "Wrong field in MissingRequired error");
            }
            other => panic!("Expected MissingRequired error for key, got: {:?}", other),
        }
    }

    /// Assert that a SettingsResult is a reserved field error.
    #[track_caller]
    pub fn assert_reserved_field<T: std::fmt::Debug>(result: &SettingsResult<T>, name: &str) {
        match result {
            Err(SettingsError::Config(ConfigError::ReservedField { name: got })) => {
                assert_eq!(got, name, "Wrong name in ReservedField error");
            }
            other => panic!("Expected ReservedField error for {}, got: {:?}", name, other),
        }
    }

    /// Assert that a SettingsResult is an Encoding error.
    #[track_caller]
    pub fn assert_encoding_error<T: std::fmt::Debug>(result: &SettingsResult<T>) {
        match result {
            Err(SettingsError::Encoding(_)) => {}
            other => panic!("Expected Encoding error, got: {:?}", other),
        }
    }

    /// Assert that a SettingsResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &SettingsResult<T>) {
        match result {
            Err(SettingsError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
