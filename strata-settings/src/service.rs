//! Entry point that hands out settings per scope.

use std::sync::Arc;

use strata_core::{Scope, SettingsConfig, SettingsResult};
use strata_storage::StoreProvider;

use crate::settings::Settings;

/// Factory for [`Settings`] instances sharing one provider and config.
///
/// Every call returns a new instance with its own empty hot buffer. Instances
/// for the same scope share the provider's store and cache.
pub struct SettingsService<P: StoreProvider> {
    provider: Arc<P>,
    config: SettingsConfig,
}

impl<P: StoreProvider> Clone for SettingsService<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
        }
    }
}

impl<P: StoreProvider> std::fmt::Debug for SettingsService<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: StoreProvider> SettingsService<P> {
    /// Service with the default config.
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            config: SettingsConfig::default(),
        }
    }

    /// Service with an explicit config, validated up front.
    pub fn with_config(provider: Arc<P>, config: SettingsConfig) -> SettingsResult<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    /// Service configured from `STRATA_*` environment variables.
    pub fn from_env(provider: Arc<P>) -> SettingsResult<Self> {
        let config = SettingsConfig::from_env()?;
        Self::with_config(provider, config)
    }

    pub fn config(&self) -> &SettingsConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Fresh settings for `scope`.
    pub fn settings(&self, scope: Scope) -> Settings<P> {
        tracing::trace!(%scope, "Creating settings instance");
        Settings::from_parts(Arc::clone(&self.provider), scope, &self.config)
    }

    /// Fresh settings for a scope given by name.
    pub fn settings_for(&self, name: &str) -> SettingsResult<Settings<P>> {
        let scope: Scope = name.parse()?;
        Ok(self.settings(scope))
    }

    pub fn document_settings(&self) -> Settings<P> {
        self.settings(Scope::Document)
    }

    pub fn script_settings(&self) -> Settings<P> {
        self.settings(Scope::Script)
    }

    pub fn user_settings(&self) -> Settings<P> {
        self.settings(Scope::User)
    }

    /// Settings for the configured default scope.
    pub fn default_settings(&self) -> Settings<P> {
        self.settings(self.config.default_scope)
    }
}
