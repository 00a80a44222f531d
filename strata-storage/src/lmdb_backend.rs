//! LMDB-backed persistent store and ephemeral cache.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each backend kind gets its
//! own LMDB environment under a root directory, and each scope gets its own
//! named database inside that environment:
//!
//! ```text
//! <root>/persistent   databases: document, script, user
//! <root>/cache        databases: document, script, user
//! ```
//!
//! Cache values are stored as `[expires_at_millis: i64 LE][utf-8 value]`.
//! Expired entries are dropped on read or by `purge_expired`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use strata_core::{
    CacheError, CacheResult, Clock, Scope, StorageError, StorageResult, SystemClock,
};

use crate::memory::{CacheLimits, StoreLimits};
use crate::traits::{EphemeralCache, PersistentStore, StoreProvider};

/// LMDB refuses keys longer than this (default `MDB_MAXKEYSIZE`).
pub const LMDB_MAX_KEY_BYTES: usize = 511;

/// Error type for LMDB backend setup.
#[derive(Debug, thiserror::Error)]
pub enum LmdbError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbError> for StorageError {
    fn from(e: LmdbError) -> Self {
        StorageError::TransactionFailed {
            reason: e.to_string(),
        }
    }
}

impl From<LmdbError> for CacheError {
    fn from(e: LmdbError) -> Self {
        CacheError::Unavailable {
            reason: e.to_string(),
        }
    }
}

/// Open (creating if needed) an environment with one named database slot per scope.
fn open_env(path: &Path, max_size_mb: usize) -> Result<Env, LmdbError> {
    std::fs::create_dir_all(path)?;

    // SAFETY: the environment is opened once per directory by its owning
    // backend and the files are not modified by anything else.
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(max_size_mb * 1024 * 1024)
            .max_dbs(Scope::ALL.len() as u32)
            .open(path)
    }
    .map_err(|e| LmdbError::EnvOpen(e.to_string()))?;

    tracing::debug!(path = %path.display(), max_size_mb, "opened LMDB environment");
    Ok(env)
}

fn create_db<K: 'static, V: 'static>(env: &Env, scope: Scope) -> Result<Database<K, V>, LmdbError> {
    let mut wtxn = env
        .write_txn()
        .map_err(|e| LmdbError::Transaction(e.to_string()))?;
    let db = env
        .create_database::<K, V>(&mut wtxn, Some(scope.as_str()))
        .map_err(|e| LmdbError::DbOpen(e.to_string()))?;
    wtxn.commit()
        .map_err(|e| LmdbError::Transaction(e.to_string()))?;
    Ok(db)
}

// ============================================================================
// PERSISTENT STORE
// ============================================================================

/// LMDB persistent store for one scope.
pub struct LmdbPersistentStore {
    env: Env,
    db: Database<Str, Str>,
    scope: Scope,
    limits: StoreLimits,
}

impl LmdbPersistentStore {
    /// Open the database for `scope` inside `env`.
    pub fn open(env: &Env, scope: Scope) -> Result<Self, LmdbError> {
        Ok(Self {
            env: env.clone(),
            db: create_db(env, scope)?,
            scope,
            limits: StoreLimits {
                max_key_bytes: Some(LMDB_MAX_KEY_BYTES),
                ..StoreLimits::unlimited()
            },
        })
    }

    /// Replace the size limits. Keys are always capped at LMDB's own limit.
    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        let max_key = limits
            .max_key_bytes
            .map_or(LMDB_MAX_KEY_BYTES, |max| max.min(LMDB_MAX_KEY_BYTES));
        self.limits = StoreLimits {
            max_key_bytes: Some(max_key),
            ..limits
        };
        self
    }

    /// Scope this store belongs to.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    fn used_bytes(&self, rtxn: &heed::RoTxn<'_>) -> StorageResult<usize> {
        let mut used = 0;
        let iter = self.db.iter(rtxn).map_err(txn_failed)?;
        for entry in iter {
            let (key, value) = entry.map_err(txn_failed)?;
            used += key.len() + value.len();
        }
        Ok(used)
    }
}

fn txn_failed(e: heed::Error) -> StorageError {
    StorageError::TransactionFailed {
        reason: e.to_string(),
    }
}

impl PersistentStore for LmdbPersistentStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let read_failed = |e: heed::Error| StorageError::ReadFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let rtxn = self.env.read_txn().map_err(read_failed)?;
        let value = self.db.get(&rtxn, key).map_err(read_failed)?;
        Ok(value.map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.limits.check_entry(key, value)?;
        let write_failed = |e: heed::Error| StorageError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let mut wtxn = self.env.write_txn().map_err(write_failed)?;
        if let Some(limit) = self.limits.max_total_bytes {
            // Checked inside the write transaction; dropping it aborts the write.
            let current = self.used_bytes(&wtxn)?;
            let replaced = self
                .db
                .get(&wtxn, key)
                .map_err(write_failed)?
                .map_or(0, |old| key.len() + old.len());
            let used = current - replaced + key.len() + value.len();
            if used > limit {
                return Err(StorageError::QuotaExceeded { used, limit });
            }
        }
        self.db.put(&mut wtxn, key, value).map_err(write_failed)?;
        wtxn.commit().map_err(write_failed)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let delete_failed = |e: heed::Error| StorageError::DeleteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let mut wtxn = self.env.write_txn().map_err(delete_failed)?;
        self.db.delete(&mut wtxn, key).map_err(delete_failed)?;
        wtxn.commit().map_err(delete_failed)?;
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let rtxn = self.env.read_txn().map_err(txn_failed)?;
        let mut keys = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(txn_failed)? {
            let (key, _) = entry.map_err(txn_failed)?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    fn entries(&self) -> StorageResult<Vec<(String, String)>> {
        let rtxn = self.env.read_txn().map_err(txn_failed)?;
        let mut entries = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(txn_failed)? {
            let (key, value) = entry.map_err(txn_failed)?;
            entries.push((key.to_string(), value.to_string()));
        }
        Ok(entries)
    }
}

// ============================================================================
// EPHEMERAL CACHE
// ============================================================================

/// LMDB TTL cache for one scope.
pub struct LmdbEphemeralCache {
    env: Env,
    db: Database<Str, Bytes>,
    scope: Scope,
    clock: Arc<dyn Clock>,
    limits: CacheLimits,
}

fn unavailable(e: heed::Error) -> CacheError {
    CacheError::Unavailable {
        reason: e.to_string(),
    }
}

impl LmdbEphemeralCache {
    /// Open the cache database for `scope` inside `env`.
    pub fn open(env: &Env, scope: Scope) -> Result<Self, LmdbError> {
        Ok(Self {
            env: env.clone(),
            db: create_db(env, scope)?,
            scope,
            clock: Arc::new(SystemClock),
            limits: CacheLimits {
                max_key_bytes: CacheLimits::default().max_key_bytes.min(LMDB_MAX_KEY_BYTES),
                ..CacheLimits::default()
            },
        })
    }

    /// Drive expiry from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Scope this cache belongs to.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Split a stored record into expiry and value.
    fn decode_record(key: &str, bytes: &[u8]) -> CacheResult<(i64, String)> {
        if bytes.len() < 8 {
            return Err(CacheError::Corrupt {
                key: key.to_string(),
                reason: format!("record is {} bytes, expected at least 8", bytes.len()),
            });
        }
        let (head, body) = bytes.split_at(8);
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(head);
        let value = std::str::from_utf8(body).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok((i64::from_le_bytes(stamp), value.to_string()))
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let now = self.clock.now().timestamp_millis();
        let expired: Vec<String> = {
            let rtxn = self.env.read_txn().map_err(unavailable)?;
            let mut expired = Vec::new();
            for entry in self.db.iter(&rtxn).map_err(unavailable)? {
                let (key, bytes) = entry.map_err(unavailable)?;
                // Unreadable records are purged along with the expired ones.
                let live = Self::decode_record(key, bytes)
                    .map(|(expires_at, _)| expires_at > now)
                    .unwrap_or(false);
                if !live {
                    expired.push(key.to_string());
                }
            }
            expired
        };

        let mut wtxn = self.env.write_txn().map_err(unavailable)?;
        let mut dropped = 0;
        for key in &expired {
            if self.db.delete(&mut wtxn, key).map_err(unavailable)? {
                dropped += 1;
            }
        }
        wtxn.commit().map_err(unavailable)?;
        Ok(dropped)
    }
}

impl EphemeralCache for LmdbEphemeralCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let record = {
            let rtxn = self.env.read_txn().map_err(unavailable)?;
            match self.db.get(&rtxn, key).map_err(unavailable)? {
                Some(bytes) => Self::decode_record(key, bytes)?,
                None => return Ok(None),
            }
        };

        let (expires_at, value) = record;
        if expires_at > self.clock.now().timestamp_millis() {
            return Ok(Some(value));
        }

        // Expired entries are dropped with best effort; a miss is reported regardless.
        if let Err(e) = self.remove(key) {
            tracing::debug!(
                scope = %self.scope,
                key,
                error = %e,
                "failed to drop expired cache entry"
            );
        }
        Ok(None)
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.limits.check_entry(key, value)?;
        let expires_at = self.limits.expires_at(self.clock.now(), ttl);

        let mut record = Vec::with_capacity(8 + value.len());
        record.extend_from_slice(&expires_at.timestamp_millis().to_le_bytes());
        record.extend_from_slice(value.as_bytes());

        let mut wtxn = self.env.write_txn().map_err(unavailable)?;
        self.db.put(&mut wtxn, key, record.as_slice()).map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(unavailable)?;
        self.db.delete(&mut wtxn, key).map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;
        Ok(())
    }
}

// ============================================================================
// PROVIDER
// ============================================================================

/// Opens both LMDB environments under a root directory and serves the
/// per-scope backends from them.
pub struct LmdbProvider {
    stores: HashMap<Scope, Arc<LmdbPersistentStore>>,
    caches: HashMap<Scope, Arc<LmdbEphemeralCache>>,
}

impl LmdbProvider {
    /// Open (or create) the backends under `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory holding the `persistent` and `cache` environments
    /// * `max_size_mb` - Map size of each environment in megabytes
    pub fn open<P: AsRef<Path>>(root: P, max_size_mb: usize) -> Result<Self, LmdbError> {
        Self::open_with(root, max_size_mb, StoreLimits::unlimited(), Arc::new(SystemClock))
    }

    /// Open with explicit store limits and cache clock.
    pub fn open_with<P: AsRef<Path>>(
        root: P,
        max_size_mb: usize,
        store_limits: StoreLimits,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbError> {
        let root = root.as_ref();
        let store_env = open_env(&root.join("persistent"), max_size_mb)?;
        let cache_env = open_env(&root.join("cache"), max_size_mb)?;

        let mut stores = HashMap::new();
        let mut caches = HashMap::new();
        for scope in Scope::ALL {
            let store = LmdbPersistentStore::open(&store_env, scope)?.with_limits(store_limits);
            stores.insert(scope, Arc::new(store));
            let cache = LmdbEphemeralCache::open(&cache_env, scope)?.with_clock(Arc::clone(&clock));
            caches.insert(scope, Arc::new(cache));
        }

        tracing::info!(root = %root.display(), "LMDB settings backends ready");
        Ok(Self { stores, caches })
    }
}

impl StoreProvider for LmdbProvider {
    type Store = LmdbPersistentStore;
    type Cache = LmdbEphemeralCache;

    fn persistent_store(&self, scope: Scope) -> StorageResult<Arc<LmdbPersistentStore>> {
        self.stores
            .get(&scope)
            .cloned()
            .ok_or_else(|| StorageError::TransactionFailed {
                reason: format!("no persistent database for scope {}", scope),
            })
    }

    fn ephemeral_cache(&self, scope: Scope) -> CacheResult<Arc<LmdbEphemeralCache>> {
        self.caches
            .get(&scope)
            .cloned()
            .ok_or_else(|| CacheError::Unavailable {
                reason: format!("no cache database for scope {}", scope),
            })
    }
}
