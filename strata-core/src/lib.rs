//! STRATA Core - Shared Types
//!
//! Scopes, the error taxonomy, configuration and the clock abstraction.
//! Every other crate in the workspace depends on this one; it holds no
//! storage or caching behavior of its own.

pub mod clock;
pub mod config;
pub mod error;
pub mod scope;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    SettingsConfig, DEFAULT_CACHE_TTL, ENV_CACHE_TTL_SECS, ENV_DEFAULT_SCOPE, MAX_CACHE_TTL,
};
pub use error::{
    CacheError, CacheResult, ConfigError, EncodingError, SettingsError, SettingsResult,
    StorageError, StorageResult,
};
pub use scope::Scope;
