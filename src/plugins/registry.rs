use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::layout::{IndexEntry, InstallLayout};
use super::loader::PluginLoader;
use super::plugin::PluginHandle;
use super::{PluginError, ValidationFailure};

struct InstalledPlugin {
    /// `None` when the bundle could not be loaded in this process. The entry
    /// stays in the index so the plugin returns once it loads again.
    handle: Option<PluginHandle>,
    entry: IndexEntry,
}

impl InstalledPlugin {
    fn is(&self, plugin: &PluginHandle) -> bool {
        self.handle.as_ref() == Some(plugin)
    }
}

#[derive(Default)]
struct RegistryState {
    loaded: bool,
    plugins: Vec<InstalledPlugin>,
}

/// Ordered set of installed plugins, backed by an [`InstallLayout`].
///
/// The persisted list is read lazily on first access. All mutations take
/// the write lock, so an install and an uninstall never interleave and
/// readers always see a complete list.
pub struct PluginRegistry {
    layout: InstallLayout,
    loader: Arc<PluginLoader>,
    state: RwLock<RegistryState>,
}

impl PluginRegistry {
    pub fn new(layout: InstallLayout, loader: Arc<PluginLoader>) -> Self {
        Self {
            layout,
            loader,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    pub async fn validate(&self, bundle: &Path) -> Result<PluginHandle, ValidationFailure> {
        self.loader.validate(bundle).await
    }

    /// Reloads the persisted list, replacing the in-memory one.
    ///
    /// Entries whose bundle fails validation are skipped with a warning but
    /// kept in the index.
    pub async fn load_installed(&self) -> Result<Vec<PluginHandle>, PluginError> {
        let mut state = self.state.write().await;
        state.plugins = self.read_persisted().await?;
        state.loaded = true;
        Ok(handles(&state.plugins))
    }

    /// Snapshot of the installed plugins in installation order.
    pub async fn installed(&self) -> Result<Vec<PluginHandle>, PluginError> {
        {
            let state = self.state.read().await;
            if state.loaded {
                return Ok(handles(&state.plugins));
            }
        }
        let mut state = self.state.write().await;
        self.ensure_loaded(&mut state).await?;
        Ok(handles(&state.plugins))
    }

    pub async fn len(&self) -> Result<usize, PluginError> {
        Ok(self.installed().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, PluginError> {
        Ok(self.installed().await?.is_empty())
    }

    pub async fn contains(&self, plugin: &PluginHandle) -> Result<bool, PluginError> {
        Ok(self.installed().await?.contains(plugin))
    }

    /// Copies `bundle` into the layout, runs the plugin's install hook and
    /// appends it to the list. Returns the installed bundle path.
    ///
    /// Nothing is left on disk or in the list when any step fails.
    pub async fn install(
        &self,
        bundle: &Path,
        plugin: PluginHandle,
    ) -> Result<PathBuf, PluginError> {
        let descriptor = plugin.descriptor();
        descriptor
            .validate_name()
            .map_err(|reason| ValidationFailure::InvalidName {
                name: descriptor.internal_name().to_string(),
                reason,
            })?;

        let mut state = self.state.write().await;
        self.ensure_loaded(&mut state).await?;

        let identity = plugin.identity();
        if state.plugins.iter().any(|p| p.is(&plugin)) {
            return Err(PluginError::DuplicateVersion { identity });
        }
        // An entry that failed to load is replaced by the fresh install.
        let dormant = state
            .plugins
            .iter()
            .position(|p| p.handle.is_none() && p.entry.identity == identity);

        let file_name = bundle
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PluginError::storage(
                    bundle,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "bundle path has no file name",
                    ),
                )
            })?
            .to_string();

        let dir = self.layout.plugin_dir(&identity);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tracing::warn!(dir = %dir.display(), "Removing leftover plugin directory");
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| PluginError::storage(&dir, e))?;
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PluginError::storage(&dir, e))?;

        let target = dir.join(&file_name);
        if let Err(e) = tokio::fs::copy(bundle, &target).await {
            discard_dir(&dir).await;
            return Err(PluginError::storage(&target, e));
        }

        if let Err(failure) = plugin.install().await {
            tracing::warn!(plugin = %identity, error = %failure, "Plugin install hook failed");
            discard_dir(&dir).await;
            return Err(PluginError::PluginReported {
                identity,
                source: failure,
            });
        }

        let replaced = dormant.map(|position| state.plugins.remove(position));
        state.plugins.push(InstalledPlugin {
            handle: Some(plugin.clone()),
            entry: IndexEntry::new(identity.clone(), file_name),
        });
        if let Err(e) = self.layout.write_index(&entries(&state.plugins)).await {
            state.plugins.pop();
            if let (Some(position), Some(entry)) = (dormant, replaced) {
                state.plugins.insert(position, entry);
            }
            discard_dir(&dir).await;
            if let Err(failure) = plugin.uninstall().await {
                tracing::warn!(
                    plugin = %identity,
                    error = %failure,
                    "Rollback uninstall hook failed"
                );
            }
            return Err(e);
        }

        tracing::info!(plugin = %identity, path = %target.display(), "Installed plugin");
        Ok(target)
    }

    /// Runs the plugin's uninstall hook, deletes its files and drops it
    /// from the list.
    ///
    /// A failing uninstall hook is logged and removal continues. If the
    /// files cannot be deleted the plugin stays installed. Once they are
    /// deleted the removal stands; a failed index write is logged and the
    /// next load prunes the stale entry.
    pub async fn uninstall(&self, plugin: &PluginHandle) -> Result<(), PluginError> {
        let mut state = self.state.write().await;
        self.ensure_loaded(&mut state).await?;

        let identity = plugin.identity();
        let position = state
            .plugins
            .iter()
            .position(|p| p.is(plugin))
            .ok_or_else(|| PluginError::NotInstalled {
                identity: identity.clone(),
            })?;

        // Run the hook on the registered instance, not the caller's copy.
        if let Some(installed) = state.plugins[position].handle.clone()
            && let Err(failure) = installed.uninstall().await
        {
            tracing::warn!(plugin = %identity, error = %failure, "Plugin uninstall hook failed");
        }

        let dir = self.layout.plugin_dir(&identity);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PluginError::storage(&dir, e)),
        }

        state.plugins.remove(position);
        if let Err(e) = self.layout.write_index(&entries(&state.plugins)).await {
            tracing::warn!(
                plugin = %identity,
                error = %e,
                "Failed to update plugin index after uninstall"
            );
        }

        tracing::info!(plugin = %identity, "Uninstalled plugin");
        Ok(())
    }

    async fn ensure_loaded(&self, state: &mut RegistryState) -> Result<(), PluginError> {
        if !state.loaded {
            state.plugins = self.read_persisted().await?;
            state.loaded = true;
        }
        Ok(())
    }

    async fn read_persisted(&self) -> Result<Vec<InstalledPlugin>, PluginError> {
        self.layout.prepare().await?;

        let (plugins, rewrite) = match self.layout.read_index().await? {
            Some(index) => {
                let expected = index.len();
                let plugins = self.load_indexed(index).await;
                let pruned = plugins.len() != expected;
                (plugins, pruned)
            }
            None => {
                let plugins = self.load_scanned().await?;
                let found = !plugins.is_empty();
                (plugins, found)
            }
        };

        if rewrite && let Err(e) = self.layout.write_index(&entries(&plugins)).await {
            tracing::warn!(error = %e, "Failed to rewrite plugin index");
        }

        tracing::debug!(
            count = plugins.iter().filter(|p| p.handle.is_some()).count(),
            root = %self.layout.root().display(),
            "Loaded installed plugins"
        );
        Ok(plugins)
    }

    /// Entries are dropped only when their directory is gone or they repeat
    /// an earlier identity. Anything else that fails to load is kept unloaded.
    async fn load_indexed(&self, index: Vec<IndexEntry>) -> Vec<InstalledPlugin> {
        let mut plugins: Vec<InstalledPlugin> = Vec::with_capacity(index.len());
        for entry in index {
            if plugins.iter().any(|p| p.entry.identity == entry.identity) {
                tracing::warn!(plugin = %entry.identity, "Dropping duplicate index entry");
                continue;
            }
            let dir = self.layout.plugin_dir(&entry.identity);
            if !tokio::fs::try_exists(&dir).await.unwrap_or(true) {
                tracing::warn!(
                    plugin = %entry.identity,
                    dir = %dir.display(),
                    "Pruning index entry with no plugin directory"
                );
                continue;
            }

            let path = self.layout.bundle_path(&entry);
            let handle = match self.loader.validate(&path).await {
                Ok(handle) if handle.identity() != entry.identity => {
                    tracing::warn!(
                        expected = %entry.identity,
                        found = %handle.identity(),
                        "Skipping plugin whose bundle changed identity"
                    );
                    None
                }
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(
                        plugin = %entry.identity,
                        error = %e,
                        "Skipping plugin that failed to load"
                    );
                    None
                }
            };
            plugins.push(InstalledPlugin { handle, entry });
        }
        plugins
    }

    async fn load_scanned(&self) -> Result<Vec<InstalledPlugin>, PluginError> {
        let mut plugins: Vec<InstalledPlugin> = Vec::new();
        for path in self.layout.scan().await? {
            if !self.loader.is_bundle(&path) {
                continue;
            }
            let handle = match self.loader.validate(&path).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping invalid installed plugin"
                    );
                    continue;
                }
            };
            let identity = handle.identity();
            let in_place = path.parent() == Some(self.layout.plugin_dir(&identity).as_path());
            if !in_place || plugins.iter().any(|p| p.is(&handle)) {
                tracing::warn!(
                    path = %path.display(),
                    plugin = %identity,
                    "Skipping misplaced plugin bundle"
                );
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let entry = IndexEntry::new(identity, file_name);
            plugins.push(InstalledPlugin {
                handle: Some(handle),
                entry,
            });
        }
        Ok(plugins)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("root", &self.layout.root())
            .finish_non_exhaustive()
    }
}

fn handles(plugins: &[InstalledPlugin]) -> Vec<PluginHandle> {
    plugins.iter().filter_map(|p| p.handle.clone()).collect()
}

fn entries(plugins: &[InstalledPlugin]) -> Vec<IndexEntry> {
    plugins.iter().map(|p| p.entry.clone()).collect()
}

async fn discard_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to clean up plugin directory");
    }
}
