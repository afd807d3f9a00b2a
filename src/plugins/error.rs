use std::path::PathBuf;

use super::descriptor::PluginIdentity;
use super::plugin::PluginFailure;

/// Why a candidate bundle was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("Unrecognized bundle extension: {path}")]
    UnrecognizedExtension { path: PathBuf },

    #[error("Bundle not readable at {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Invalid bundle manifest at {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Invalid plugin name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Unknown plugin entry point: {entry_point}")]
    UnknownEntryPoint { entry_point: String },

    #[error("Entry point '{entry_point}' built {actual}, bundle declares {declared}")]
    IdentityMismatch {
        entry_point: String,
        declared: PluginIdentity,
        actual: PluginIdentity,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin is not valid: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("Plugin {identity} is already installed")]
    DuplicateVersion { identity: PluginIdentity },

    #[error("Plugin {identity} is not installed")]
    NotInstalled { identity: PluginIdentity },

    #[error("Plugin {identity} failed: {source}")]
    PluginReported {
        identity: PluginIdentity,
        #[source]
        source: PluginFailure,
    },

    #[error("Plugin storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not load installed plugins from {path}: {reason}")]
    RegistryLoad { path: PathBuf, reason: String },
}

impl PluginError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Message suitable for the end user.
    ///
    /// Plugin-reported failures pass the plugin's own message through.
    pub fn user_message(&self) -> String {
        match self {
            PluginError::Validation(_) => "The plugin is not valid and cannot be loaded".into(),
            PluginError::DuplicateVersion { .. } => {
                "This version of the plugin is already installed. Uninstall it before installing it again".into()
            }
            PluginError::NotInstalled { .. } => "The plugin is not installed".into(),
            PluginError::PluginReported { source, .. } => source.message().to_string(),
            PluginError::Storage { .. } => {
                "An error occurred while installing or uninstalling the plugin".into()
            }
            PluginError::RegistryLoad { .. } => {
                "The list of installed plugins could not be loaded".into()
            }
        }
    }
}
