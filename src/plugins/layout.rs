//! On-disk layout of installed plugins.
//!
//! ```text
//! <root>/
//! ├── installed.json        # installation order
//! ├── sign-audit-3/
//! │   └── audit.sigplugin
//! └── stamp-1/
//!     └── stamp.json
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PluginError;
use super::descriptor::PluginIdentity;

pub const INDEX_FILE: &str = "installed.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    #[serde(flatten)]
    pub identity: PluginIdentity,
    /// Bundle file name inside the plugin's directory.
    pub bundle: String,
    pub installed_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn new(identity: PluginIdentity, bundle: impl Into<String>) -> Self {
        Self {
            identity,
            bundle: bundle.into(),
            installed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct InstallIndex {
    plugins: Vec<IndexEntry>,
}

#[derive(Debug, Clone)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn plugin_dir(&self, identity: &PluginIdentity) -> PathBuf {
        self.root.join(identity.storage_name())
    }

    pub fn bundle_path(&self, entry: &IndexEntry) -> PathBuf {
        self.plugin_dir(&entry.identity).join(&entry.bundle)
    }

    /// Creates the root if needed and checks that it can be listed.
    pub async fn prepare(&self) -> Result<(), PluginError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| self.load_error(e))?;
        let _entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| self.load_error(e))?;
        Ok(())
    }

    /// Returns `None` when no index has been written yet.
    pub async fn read_index(&self) -> Result<Option<Vec<IndexEntry>>, PluginError> {
        let path = self.index_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.load_error(e)),
        };
        let index: InstallIndex =
            serde_json::from_str(&content).map_err(|e| PluginError::RegistryLoad {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Some(index.plugins))
    }

    /// Replaces the index atomically: write to a sibling file, then rename.
    pub async fn write_index(&self, entries: &[IndexEntry]) -> Result<(), PluginError> {
        let path = self.index_path();
        let tmp = self.root.join(format!(".{}.tmp", INDEX_FILE));
        let index = InstallIndex {
            plugins: entries.to_vec(),
        };
        let content = serde_json::to_vec_pretty(&index)
            .map_err(|e| PluginError::storage(&path, e.into()))?;

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| PluginError::storage(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PluginError::storage(&path, e));
        }
        Ok(())
    }

    /// Lists the files inside every plugin directory, ordered by directory
    /// name and then file name. Used when no index exists.
    pub async fn scan(&self) -> Result<Vec<PathBuf>, PluginError> {
        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| self.load_error(e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.load_error(e))? {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        let mut files = Vec::new();
        for dir in dirs {
            let mut found = Vec::new();
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %e,
                        "Skipping unreadable plugin directory"
                    );
                    continue;
                }
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                    found.push(entry.path());
                }
            }
            found.sort();
            files.extend(found);
        }
        Ok(files)
    }

    fn load_error(&self, e: std::io::Error) -> PluginError {
        PluginError::RegistryLoad {
            path: self.root.clone(),
            reason: e.to_string(),
        }
    }
}
