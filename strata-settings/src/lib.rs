//! STRATA Settings - Tiered Settings Store
//!
//! Scoped key-value settings served from three tiers:
//!
//! 1. a hot buffer local to the settings instance, holding its own writes
//! 2. a shared ephemeral cache with a TTL
//! 3. the persistent store, which is the source of truth
//!
//! Values are encoded to strings by [`codec`] and decoded back into
//! `serde_json::Value`. [`SettingsService`] hands out [`Settings`] for the
//! document, script and user scopes over any [`StoreProvider`].

pub mod codec;
pub mod service;
pub mod settings;
pub mod telemetry;
pub mod tiered;

pub use codec::{decode, decode_as, encode, encode_value, MAX_NESTING_DEPTH};
pub use service::SettingsService;
pub use settings::{is_reserved_field, Field, Settings, RESERVED_FIELDS};
pub use telemetry::{init_logging, LoggingConfig};
pub use tiered::{TierStats, TieredStore};

pub use strata_core::{
    ConfigError, EncodingError, Scope, SettingsConfig, SettingsError, SettingsResult,
};
pub use strata_storage::{LmdbProvider, MemoryProvider, StoreProvider};
