use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;

use super::ValidationFailure;
use super::descriptor::PluginDescriptor;
use super::manifest::BundleManifest;
use super::plugin::{Plugin, PluginHandle};
use crate::config::DEFAULT_BUNDLE_EXTENSIONS;

type PluginFactory = Arc<dyn Fn(PluginDescriptor) -> Arc<dyn Plugin> + Send + Sync>;

/// Turns bundle files into loaded plugins.
///
/// A bundle names an entry point; the loader maps entry points to the
/// factories registered by the host. A bundle whose entry point was never
/// registered is not loadable.
#[derive(Clone)]
pub struct PluginLoader {
    entry_points: Arc<DashMap<String, PluginFactory>>,
    extensions: Vec<String>,
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::with_extensions(DEFAULT_BUNDLE_EXTENSIONS.iter().map(|e| e.to_string()))
    }

    pub fn with_extensions(extensions: impl IntoIterator<Item = String>) -> Self {
        Self {
            entry_points: Arc::new(DashMap::new()),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn register<F>(&self, entry_point: impl Into<String>, factory: F)
    where
        F: Fn(PluginDescriptor) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.entry_points.insert(entry_point.into(), Arc::new(factory));
    }

    pub fn with<F>(self, entry_point: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginDescriptor) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(entry_point, factory);
        self
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_bundle(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    /// Loads the bundle at `path` and instantiates its plugin.
    ///
    /// Has no side effects: the plugin's install hook is not run.
    pub async fn validate(&self, path: &Path) -> Result<PluginHandle, ValidationFailure> {
        if !self.is_bundle(path) {
            return Err(ValidationFailure::UnrecognizedExtension {
                path: path.to_path_buf(),
            });
        }

        let manifest = BundleManifest::load(path).await?;
        let factory = self
            .entry_points
            .get(&manifest.entry_point)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| ValidationFailure::UnknownEntryPoint {
                entry_point: manifest.entry_point.clone(),
            })?;

        let declared = manifest.descriptor.identity();
        let handle = PluginHandle::from_arc(factory(manifest.descriptor));
        let actual = handle.identity();
        if actual != declared {
            return Err(ValidationFailure::IdentityMismatch {
                entry_point: manifest.entry_point,
                declared,
                actual,
            });
        }

        tracing::debug!(plugin = %actual, path = %path.display(), "Validated plugin bundle");
        Ok(handle)
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entry_points: Vec<String> =
            self.entry_points.iter().map(|e| e.key().clone()).collect();
        entry_points.sort();
        f.debug_struct("PluginLoader")
            .field("entry_points", &entry_points)
            .field("extensions", &self.extensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct Echo(PluginDescriptor);

    #[async_trait]
    impl Plugin for Echo {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.0
        }
    }

    fn loader() -> PluginLoader {
        PluginLoader::new().with("test.Echo", |d| Arc::new(Echo(d)) as Arc<dyn Plugin>)
    }

    fn write_bundle(dir: &Path, file: &str, name: &str, entry_point: &str) -> std::path::PathBuf {
        let path = dir.join(file);
        std::fs::write(
            &path,
            format!(
                r#"{{"internalName":"{name}","versionCode":1,"version":"1.0","entryPoint":"{entry_point}"}}"#
            ),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_validate_known_entry_point() {
        let dir = tempdir().unwrap();
        let path = write_bundle(dir.path(), "echo.sigplugin", "echo", "test.Echo");

        let handle = loader().validate(&path).await.unwrap();
        assert_eq!(handle.descriptor().internal_name(), "echo");
        assert_eq!(handle.descriptor().version_code(), 1);
    }

    #[tokio::test]
    async fn test_unknown_entry_point() {
        let dir = tempdir().unwrap();
        let path = write_bundle(dir.path(), "x.sigplugin", "x", "test.Missing");

        let err = loader().validate(&path).await.unwrap_err();
        assert!(matches!(err, ValidationFailure::UnknownEntryPoint { .. }));
    }

    #[tokio::test]
    async fn test_extension_check() {
        let dir = tempdir().unwrap();
        let path = write_bundle(dir.path(), "echo.zip", "echo", "test.Echo");

        let err = loader().validate(&path).await.unwrap_err();
        assert!(matches!(err, ValidationFailure::UnrecognizedExtension { .. }));

        let upper = write_bundle(dir.path(), "echo.SIGPLUGIN", "echo", "test.Echo");
        assert!(loader().validate(&upper).await.is_ok());
    }

    #[tokio::test]
    async fn test_identity_mismatch() {
        let dir = tempdir().unwrap();
        let path = write_bundle(dir.path(), "liar.sigplugin", "liar", "test.Fixed");
        let loader = PluginLoader::new().with("test.Fixed", |_| {
            Arc::new(Echo(PluginDescriptor::new("someone-else", 9, "9"))) as Arc<dyn Plugin>
        });

        let err = loader.validate(&path).await.unwrap_err();
        assert!(matches!(err, ValidationFailure::IdentityMismatch { .. }));
    }

    #[test]
    fn test_custom_extensions_normalized() {
        let loader = PluginLoader::with_extensions(vec![".AFP".to_string()]);
        assert_eq!(loader.extensions(), ["afp"]);
        assert!(loader.is_bundle(Path::new("/tmp/p.afp")));
        assert!(!loader.is_bundle(Path::new("/tmp/p.json")));
        assert!(!loader.is_bundle(Path::new("/tmp/noext")));
    }
}
