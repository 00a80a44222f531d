//! Configuration types

use crate::error::ConfigError;
use crate::scope::Scope;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL applied to every cache write unless configured otherwise (6 hours).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(21_600);

/// Longest TTL the ephemeral cache honours.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(21_600);

/// Environment variable holding the cache TTL in whole seconds.
pub const ENV_CACHE_TTL_SECS: &str = "STRATA_CACHE_TTL_SECS";

/// Environment variable holding the default scope name.
pub const ENV_DEFAULT_SCOPE: &str = "STRATA_DEFAULT_SCOPE";

/// Settings configuration.
///
/// The TTL is fixed for the lifetime of a settings instance; it is not
/// configurable per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// TTL for every cache put, including repopulation after a miss.
    pub cache_ttl: Duration,
    /// Scope used by `SettingsService::default_settings`.
    pub default_scope: Scope,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            default_scope: Scope::default(),
        }
    }
}

impl SettingsConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the default scope.
    pub fn with_default_scope(mut self, scope: Scope) -> Self {
        self.default_scope = scope;
        self
    }

    /// Check that the TTL is within `1s..=MAX_CACHE_TTL` (whole seconds).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = self.cache_ttl.as_secs();
        if secs == 0 || self.cache_ttl > MAX_CACHE_TTL || self.cache_ttl.subsec_nanos() != 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: format!("{:?}", self.cache_ttl),
                reason: format!(
                    "must be a whole number of seconds between 1 and {}",
                    MAX_CACHE_TTL.as_secs()
                ),
            });
        }
        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STRATA_CACHE_TTL_SECS`: cache TTL in seconds (default: 21600)
    /// - `STRATA_DEFAULT_SCOPE`: `document`, `script` or `user` (default: script)
    ///
    /// Unset variables fall back to defaults. Malformed values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: ENV_CACHE_TTL_SECS.to_string(),
                value: raw.clone(),
                reason: "must be an integer number of seconds".to_string(),
            })?;
            config.cache_ttl = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(ENV_DEFAULT_SCOPE) {
            config.default_scope = raw.trim().parse()?;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SettingsConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(21_600));
        assert_eq!(config.default_scope, Scope::Script);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = SettingsConfig::new()
            .with_ttl(Duration::from_secs(600))
            .with_default_scope(Scope::User);
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.default_scope, Scope::User);
    }

    #[test]
    fn test_validate_rejects_out_of_range_ttl() {
        for ttl in [
            Duration::ZERO,
            Duration::from_secs(21_601),
            Duration::from_millis(1500),
        ] {
            let err = SettingsConfig::new().with_ttl(ttl).validate().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref field, .. } if field == "cache_ttl"
            ));
        }
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = SettingsConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SettingsConfig::default());
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = SettingsConfig::from_lookup(lookup_from(&[
            (ENV_CACHE_TTL_SECS, "120"),
            (ENV_DEFAULT_SCOPE, "document"),
        ]))
        .unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(120));
        assert_eq!(config.default_scope, Scope::Document);
    }

    #[test]
    fn test_from_lookup_rejects_malformed_ttl() {
        let err = SettingsConfig::from_lookup(lookup_from(&[(ENV_CACHE_TTL_SECS, "six hours")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_lookup_rejects_invalid_scope() {
        let err = SettingsConfig::from_lookup(lookup_from(&[(ENV_DEFAULT_SCOPE, "global")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidScope {
                value: "global".to_string()
            }
        );
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = SettingsConfig::new().with_ttl(Duration::from_secs(60));
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SettingsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
