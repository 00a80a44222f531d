//! STRATA Storage - Backend Traits and Implementations
//!
//! Defines the persistent store and ephemeral cache abstractions the tiered
//! settings store is layered over, plus two families of backends:
//! in-memory (for tests and single-process use) and LMDB (via heed).

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{
    LmdbEphemeralCache, LmdbError, LmdbPersistentStore, LmdbProvider, LMDB_MAX_KEY_BYTES,
};
pub use memory::{
    CacheLimits, MemoryEphemeralCache, MemoryPersistentStore, MemoryProvider, StoreLimits,
};
pub use traits::{EphemeralCache, PersistentStore, StoreProvider};
