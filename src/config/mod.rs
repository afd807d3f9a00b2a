//! Process configuration: property switches, environment overrides and
//! registry settings.
//!
//! ```rust,no_run
//! use xmlsign_plugins::config::{SettingsLoader, MemoryProperties, PropertyStoreExt};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::new().load("settings.json").await?;
//! let properties = MemoryProperties::new();
//! properties.set_bool("org.apache.xml.security.ignoreLineBreaks", true).await?;
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod properties;
pub mod settings;

pub use env::EnvProperties;
pub use properties::{MemoryProperties, PropertyStore, PropertyStoreExt};
pub use settings::{DEFAULT_BUNDLE_EXTENSIONS, Settings, SettingsLoader};

use thiserror::Error;

/// Errors raised while reading or writing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Property store '{store}' is read-only")]
    ReadOnly { store: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
