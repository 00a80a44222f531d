//! Settings facade over a tiered store.
//!
//! Values go in as anything serializable and come out as `serde_json::Value`
//! (or a concrete type via `get_as`). Mutating methods return `&mut Self` so
//! calls can be chained:
//!
//! ```ignore
//! settings
//!     .set_property("email", "a@example.com")?
//!     .set_property("config", &json!({"retries": 3}))?;
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strata_core::{ConfigError, Scope, SettingsConfig, SettingsResult};
use strata_storage::StoreProvider;

use crate::codec;
use crate::tiered::{TierStats, TieredStore};

/// Names that cannot be used through [`Settings::field`].
///
/// They name the instance's own parts; names starting with `_` are reserved
/// as well.
pub const RESERVED_FIELDS: [&str; 4] =
    ["scope", "persistent_store", "ephemeral_cache", "hot_buffer"];

/// Whether `name` is unavailable for field-style access.
pub fn is_reserved_field(name: &str) -> bool {
    name.starts_with('_') || RESERVED_FIELDS.contains(&name)
}

fn require_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::MissingRequired {
            field: "key".to_string(),
        });
    }
    Ok(())
}

/// Settings bound to one scope.
pub struct Settings<P: StoreProvider> {
    tiers: TieredStore<P>,
}

impl<P: StoreProvider> fmt::Debug for Settings<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings").field("tiers", &self.tiers).finish()
    }
}

impl<P: StoreProvider> fmt::Display for Settings<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Settings({})", self.tiers.scope())
    }
}

impl<P: StoreProvider> Settings<P> {
    /// Settings for `scope` with the default cache TTL.
    pub fn new(provider: Arc<P>, scope: Scope) -> Self {
        Self::from_parts(provider, scope, &SettingsConfig::default())
    }

    /// Settings for `scope` with a validated config.
    pub fn with_config(
        provider: Arc<P>,
        scope: Scope,
        config: &SettingsConfig,
    ) -> SettingsResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(provider, scope, config))
    }

    /// Settings for a scope given by name. Unknown names fail before anything is bound.
    pub fn for_scope_name(provider: Arc<P>, name: &str) -> SettingsResult<Self> {
        let scope: Scope = name.parse()?;
        Ok(Self::new(provider, scope))
    }

    pub(crate) fn from_parts(provider: Arc<P>, scope: Scope, config: &SettingsConfig) -> Self {
        Self {
            tiers: TieredStore::new(provider, scope, config.cache_ttl),
        }
    }

    pub fn scope(&self) -> Scope {
        self.tiers.scope()
    }

    pub fn stats(&self) -> TierStats {
        self.tiers.stats()
    }

    /// The underlying tiered store.
    pub fn tiers(&self) -> &TieredStore<P> {
        &self.tiers
    }

    /// Read and decode a property. `None` if it is stored nowhere.
    pub fn get_property(&self, key: &str) -> SettingsResult<Option<Value>> {
        require_key(key)?;
        Ok(self.tiers.read(key)?.map(|raw| codec::decode(&raw)))
    }

    /// Read a property as a concrete type.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SettingsResult<Option<T>> {
        require_key(key)?;
        match self.tiers.read(key)? {
            Some(raw) => Ok(Some(codec::decode_as(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a property through every tier.
    ///
    /// Encoding happens first; a value that cannot be encoded writes nothing.
    pub fn set_property<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> SettingsResult<&mut Self> {
        require_key(key)?;
        let raw = codec::encode(value)?;
        self.tiers.write(key, raw)?;
        Ok(self)
    }

    /// Remove a property from every tier.
    pub fn delete_property(&mut self, key: &str) -> SettingsResult<&mut Self> {
        require_key(key)?;
        self.tiers.delete(key)?;
        Ok(self)
    }

    /// All property keys, sorted.
    pub fn get_keys(&self) -> SettingsResult<Vec<String>> {
        self.tiers.keys()
    }

    /// Every property, decoded.
    pub fn get_properties(&self) -> SettingsResult<BTreeMap<String, Value>> {
        Ok(self
            .tiers
            .entries()?
            .into_iter()
            .map(|(key, raw)| {
                let value = codec::decode(&raw);
                (key, value)
            })
            .collect())
    }

    /// Write several properties. With `delete_all_others`, every key not in
    /// `properties` is deleted first.
    ///
    /// All keys and values are validated and encoded before anything is
    /// written. Writes are not atomic: a store failure part way through
    /// leaves the earlier writes in place.
    pub fn set_properties<I, K, V>(
        &mut self,
        properties: I,
        delete_all_others: bool,
    ) -> SettingsResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        let mut encoded = Vec::new();
        for (key, value) in properties {
            let key = key.as_ref();
            require_key(key)?;
            encoded.push((key.to_string(), codec::encode(&value)?));
        }

        if delete_all_others {
            let keep: HashSet<&str> = encoded.iter().map(|(key, _)| key.as_str()).collect();
            for key in self.tiers.keys()? {
                if !keep.contains(key.as_str()) {
                    self.tiers.delete(&key)?;
                }
            }
        }

        for (key, raw) in encoded {
            self.tiers.write(&key, raw)?;
        }
        tracing::debug!(scope = %self.scope(), delete_all_others, "Wrote property batch");
        Ok(self)
    }

    /// Delete every property, one key at a time.
    pub fn delete_all_properties(&mut self) -> SettingsResult<&mut Self> {
        let keys = self.tiers.keys()?;
        for key in &keys {
            self.tiers.delete(key)?;
        }
        tracing::debug!(scope = %self.scope(), deleted = keys.len(), "Deleted all properties");
        Ok(self)
    }

    /// Field-style handle for one property name.
    pub fn field(&mut self, name: &str) -> SettingsResult<Field<'_, P>> {
        require_key(name)?;
        if is_reserved_field(name) {
            return Err(ConfigError::ReservedField {
                name: name.to_string(),
            }
            .into());
        }
        Ok(Field {
            settings: self,
            name: name.to_string(),
        })
    }
}

/// A single property reached by name, as an alternative to the keyed methods.
pub struct Field<'a, P: StoreProvider> {
    settings: &'a mut Settings<P>,
    name: String,
}

impl<P: StoreProvider> Field<'_, P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> SettingsResult<Option<Value>> {
        self.settings.get_property(&self.name)
    }

    pub fn get_as<T: DeserializeOwned>(&self) -> SettingsResult<Option<T>> {
        self.settings.get_as(&self.name)
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, value: &T) -> SettingsResult<&mut Self> {
        self.settings.set_property(&self.name, value)?;
        Ok(self)
    }

    pub fn delete(&mut self) -> SettingsResult<&mut Self> {
        self.settings.delete_property(&self.name)?;
        Ok(self)
    }
}
