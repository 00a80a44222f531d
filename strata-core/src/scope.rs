//! Settings scopes

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Isolation boundary for a settings instance.
///
/// Each scope owns its own persistent store and its own cache; nothing is
/// shared between scopes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Bound to the current document and script.
    Document,
    /// Bound to the script, shared by all of its users.
    #[default]
    Script,
    /// Bound to the current user and script.
    User,
}

impl Scope {
    /// All scopes, in a stable order.
    pub const ALL: [Scope; 3] = [Scope::Document, Scope::Script, Scope::User];

    /// Lowercase name, also used as the backend namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Document => "document",
            Scope::Script => "script",
            Scope::User => "user",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ConfigError;

    /// Only the exact lowercase names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Scope::Document),
            "script" => Ok(Scope::Script),
            "user" => Ok(Scope::User),
            _ => Err(ConfigError::InvalidScope {
                value: s.to_string(),
            }),
        }
    }
}
