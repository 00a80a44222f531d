//! Error types for STRATA operations

use thiserror::Error;

/// Configuration and argument errors. Always fatal to the call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid scope '{value}': expected one of document, script, user")]
    InvalidScope { value: String },

    #[error("Required argument missing: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Field '{name}' is reserved and cannot be used as a property name")]
    ReservedField { name: String },
}

/// Value codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Value cannot be serialized: {reason}")]
    Serialize { reason: String },

    #[error("Value is nested deeper than {max_depth} levels")]
    NestingTooDeep { max_depth: usize },

    #[error("Stored value does not match the requested type: {reason}")]
    Deserialize { reason: String },
}

/// Ephemeral cache errors.
///
/// These never leave the tiered store: every cache failure is logged and the
/// operation continues on the remaining tiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache key is {len} bytes, limit is {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("Cache value is {len} bytes, limit is {max}")]
    ValueTooLarge { len: usize, max: usize },

    #[error("Corrupt cache entry for '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Persistent store errors. Always surfaced to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Read failed for '{key}': {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Write failed for '{key}': {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Delete failed for '{key}': {reason}")]
    DeleteFailed { key: String, reason: String },

    #[error("Storage quota exceeded: {used} of {limit} bytes")]
    QuotaExceeded { used: usize, limit: usize },

    #[error("Value for '{key}' is {len} bytes, limit is {max}")]
    ValueTooLarge { key: String, len: usize, max: usize },

    #[error("Key is {len} bytes, limit is {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Master error type for all STRATA errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Result type alias for persistent store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_invalid_scope() {
        let err = ConfigError::InvalidScope {
            value: "global".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid scope"));
        assert!(msg.contains("global"));
    }

    #[test]
    fn test_config_error_display_reserved_field() {
        let err = ConfigError::ReservedField {
            name: "hot_buffer".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("hot_buffer"));
        assert!(msg.contains("reserved"));
    }

    #[test]
    fn test_encoding_error_display_nesting() {
        let err = EncodingError::NestingTooDeep { max_depth: 100 };
        assert!(format!("{}", err).contains("100"));
    }

    #[test]
    fn test_storage_error_display_quota() {
        let err = StorageError::QuotaExceeded {
            used: 512_001,
            limit: 512_000,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("quota exceeded"));
        assert!(msg.contains("512001"));
        assert!(msg.contains("512000"));
    }

    #[test]
    fn test_cache_error_display_unavailable() {
        let err = CacheError::Unavailable {
            reason: "service down".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Cache unavailable"));
        assert!(msg.contains("service down"));
    }

    #[test]
    fn test_settings_error_from_variants() {
        let config = SettingsError::from(ConfigError::MissingRequired {
            field: "key".to_string(),
        });
        assert!(matches!(config, SettingsError::Config(_)));

        let encoding = SettingsError::from(EncodingError::NestingTooDeep { max_depth: 1 });
        assert!(matches!(encoding, SettingsError::Encoding(_)));

        let storage = SettingsError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, SettingsError::Storage(_)));

        let cache = SettingsError::from(CacheError::Unavailable {
            reason: "x".to_string(),
        });
        assert!(matches!(cache, SettingsError::Cache(_)));
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let err = StorageError::LockPoisoned;
        assert_eq!(format!("{}", err), "Storage lock poisoned");
    }
}
