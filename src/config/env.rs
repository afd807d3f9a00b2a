//! Environment variable overrides.
//!
//! Environment variables are treated as immutable at runtime because
//! modifying them is not thread-safe.

use super::properties::PropertyStore;
use super::{ConfigError, ConfigResult};

pub const DEFAULT_ENV_PREFIX: &str = "XMLSIGN_";

/// Read-only view of the environment as a [`PropertyStore`].
///
/// Keys map to variable names by uppercasing and replacing `.` with `_`,
/// so `plugins.dir` under prefix `XMLSIGN_` reads `XMLSIGN_PLUGINS_DIR`.
#[derive(Debug, Clone)]
pub struct EnvProperties {
    prefix: String,
}

impl EnvProperties {
    pub fn new() -> Self {
        Self::prefixed(DEFAULT_ENV_PREFIX)
    }

    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }
}

impl Default for EnvProperties {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PropertyStore for EnvProperties {
    fn name(&self) -> &str {
        "env"
    }

    async fn get(&self, key: &str) -> ConfigResult<Option<String>> {
        match std::env::var(self.env_key(key)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    async fn set(&self, _key: &str, _value: &str) -> ConfigResult<()> {
        Err(ConfigError::ReadOnly {
            store: self.name().to_string(),
        })
    }

    async fn remove(&self, _key: &str) -> ConfigResult<bool> {
        Err(ConfigError::ReadOnly {
            store: self.name().to_string(),
        })
    }
}
