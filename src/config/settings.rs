//! Registry and pipeline settings.
//!
//! Loaded from (lowest to highest priority):
//! 1. Built-in defaults
//! 2. A JSON settings file, when present
//! 3. `XMLSIGN_*` environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::env::EnvProperties;
use super::properties::PropertyStore;
use super::{ConfigError, ConfigResult};

/// File extensions recognized as plugin bundles.
pub const DEFAULT_BUNDLE_EXTENSIONS: &[&str] = &["sigplugin", "json"];

const PLUGINS_SUBDIR: &str = "plugins";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Installation root for plugin bundles. `None` selects the
    /// application data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,

    #[serde(default = "default_bundle_extensions")]
    pub bundle_extensions: Vec<String>,

    /// Per-hook time limit in milliseconds. Hooks run unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_timeout_ms: Option<u64>,
}

fn default_bundle_extensions() -> Vec<String> {
    DEFAULT_BUNDLE_EXTENSIONS
        .iter()
        .map(|e| (*e).to_string())
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            plugins_dir: None,
            bundle_extensions: default_bundle_extensions(),
            hook_timeout_ms: None,
        }
    }
}

impl Settings {
    pub fn with_plugins_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugins_dir = Some(dir.into());
        self
    }

    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Installation root, falling back to `<data dir>/plugins`.
    pub fn resolved_plugins_dir(&self) -> Option<PathBuf> {
        self.plugins_dir.clone().or_else(default_plugins_dir)
    }

    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_ms.map(Duration::from_millis)
    }
}

pub fn default_plugins_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "xmlsign")
        .map(|dirs| dirs.data_dir().join(PLUGINS_SUBDIR))
}

#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    env: EnvProperties,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(env: EnvProperties) -> Self {
        Self { env }
    }

    pub async fn load(&self, path: impl AsRef<Path>) -> ConfigResult<Settings> {
        let path = path.as_ref();
        let mut settings = if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path).await?;
            serde_json::from_str(&content)?
        } else {
            tracing::debug!(path = %path.display(), "Settings file not found, using defaults");
            Settings::default()
        };
        self.apply_env(&mut settings).await?;
        Ok(settings)
    }

    pub async fn apply_env(&self, settings: &mut Settings) -> ConfigResult<()> {
        if let Some(dir) = self.env.get("plugins.dir").await? {
            settings.plugins_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = self.env.get("hook.timeout.ms").await? {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "hook.timeout.ms".to_string(),
                    message: e.to_string(),
                })?;
            settings.hook_timeout_ms = Some(millis);
        }
        Ok(())
    }
}
