//! Logging setup.
//!
//! The library only emits `tracing` events. Binaries and demos call
//! [`init_logging`] once at startup to print them.

use strata_core::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter directive.
pub const ENV_LOG_FILTER: &str = "STRATA_LOG";

/// Environment variable selecting JSON output (`1` or `true`).
pub const ENV_LOG_JSON: &str = "STRATA_LOG_JSON";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `strata_settings=debug`.
    pub filter: String,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Read `STRATA_LOG` and `STRATA_LOG_JSON`, defaulting to `info` text output.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            filter: lookup(ENV_LOG_FILTER)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.filter),
            json: lookup(ENV_LOG_JSON)
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.json),
        }
    }
}

/// Install a global subscriber.
///
/// Returns `Ok(false)` if a subscriber was already installed; the existing
/// one is kept. An unparsable filter directive is a config error.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::InvalidValue {
        field: ENV_LOG_FILTER.to_string(),
        value: config.filter.clone(),
        reason: e.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!(filter = %config.filter, json = config.json, "Logging initialized");
    }
    Ok(installed)
}
