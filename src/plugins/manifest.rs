use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ValidationFailure;
use super::descriptor::PluginDescriptor;

/// Contents of a plugin bundle: the descriptor plus the entry point the
/// loader resolves to a plugin implementation.
///
/// ```json
/// {
///   "internalName": "sign-audit",
///   "versionCode": 3,
///   "version": "1.2",
///   "authors": ["Signing Team"],
///   "description": "Records every signature",
///   "entryPoint": "audit.SignAudit"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    #[serde(flatten)]
    pub descriptor: PluginDescriptor,
    pub entry_point: String,
}

impl BundleManifest {
    pub fn new(descriptor: PluginDescriptor, entry_point: impl Into<String>) -> Self {
        Self {
            descriptor,
            entry_point: entry_point.into(),
        }
    }

    pub async fn load(path: &Path) -> Result<Self, ValidationFailure> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ValidationFailure::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
        let manifest: Self =
            serde_json::from_str(&content).map_err(|e| ValidationFailure::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if manifest.entry_point.trim().is_empty() {
            return Err(ValidationFailure::InvalidManifest {
                path: path.to_path_buf(),
                reason: "entryPoint must not be empty".into(),
            });
        }
        manifest
            .descriptor
            .validate_name()
            .map_err(|reason| ValidationFailure::InvalidName {
                name: manifest.descriptor.internal_name().to_string(),
                reason,
            })?;

        Ok(manifest)
    }

    /// Writes the manifest as a bundle file at `path`.
    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, content).await
    }
}
