//! Long-lived service wiring the provider bootstrap, plugin registry and
//! hook pipeline together.

use std::path::Path;
use std::sync::Arc;

use crate::config::{MemoryProperties, PropertyStore, Settings};
use crate::pipeline::{HookPipeline, SignedDocument, Signer, SigningRequest};
use crate::plugins::{
    InstallLayout, Plugin, PluginDescriptor, PluginError, PluginHandle, PluginLoader,
    PluginRegistry,
};
use crate::provider::{
    BootstrapReport, ImplementationCatalog, InMemoryProviderTable, InstallStrategy, ProviderTable,
    SignatureProviderBootstrap,
};
use crate::{Error, Result};

type EntryPointFactory = Arc<dyn Fn(PluginDescriptor) -> Arc<dyn Plugin> + Send + Sync>;

/// What [`SignatureService::start`] found.
#[derive(Debug)]
pub struct StartupReport {
    pub bootstrap: BootstrapReport,
    pub plugins: Vec<PluginHandle>,
    /// Set when the installed list could not be read. The service keeps
    /// running with no plugins.
    pub load_error: Option<Error>,
}

#[derive(Default)]
pub struct SignatureServiceBuilder {
    settings: Settings,
    entry_points: Vec<(String, EntryPointFactory)>,
    provider_table: Option<Arc<dyn ProviderTable>>,
    properties: Option<Arc<dyn PropertyStore>>,
    catalog: ImplementationCatalog,
    strategies: Option<Vec<InstallStrategy>>,
}

impl SignatureServiceBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Makes bundles naming `entry_point` loadable.
    pub fn entry_point<F>(mut self, entry_point: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginDescriptor) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.entry_points
            .push((entry_point.into(), Arc::new(factory)));
        self
    }

    pub fn provider_table(mut self, table: Arc<dyn ProviderTable>) -> Self {
        self.provider_table = Some(table);
        self
    }

    pub fn properties(mut self, properties: Arc<dyn PropertyStore>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn implementations(mut self, catalog: ImplementationCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn install_strategies(mut self, strategies: Vec<InstallStrategy>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn build(self) -> Result<SignatureService> {
        let root = self.settings.resolved_plugins_dir().ok_or_else(|| {
            Error::Config(crate::config::ConfigError::InvalidValue {
                key: "pluginsDir".into(),
                message: "no plugins directory configured and no data directory available"
                    .into(),
            })
        })?;

        let loader = PluginLoader::with_extensions(self.settings.bundle_extensions.clone());
        for (entry_point, factory) in self.entry_points {
            loader.register(entry_point, move |descriptor| factory(descriptor));
        }
        let registry = Arc::new(PluginRegistry::new(
            InstallLayout::new(root),
            Arc::new(loader),
        ));

        let table = self
            .provider_table
            .unwrap_or_else(|| Arc::new(InMemoryProviderTable::new()));
        let properties = self
            .properties
            .unwrap_or_else(|| Arc::new(MemoryProperties::new()));
        let mut bootstrap = SignatureProviderBootstrap::new(table, properties, self.catalog);
        if let Some(strategies) = self.strategies {
            bootstrap = bootstrap.with_strategies(strategies);
        }
        let bootstrap = Arc::new(bootstrap);

        let pipeline = HookPipeline::new(Arc::clone(&registry), Arc::clone(&bootstrap))
            .with_hook_timeout(self.settings.hook_timeout());

        Ok(SignatureService {
            settings: self.settings,
            bootstrap,
            registry,
            pipeline,
        })
    }
}

/// Entry point for the host application and its UI.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use xmlsign_plugins::{Settings, SignatureService};
///
/// # async fn example() -> Result<(), xmlsign_plugins::Error> {
/// let service = SignatureService::builder()
///     .settings(Settings::default().with_plugins_dir("/var/lib/xmlsign/plugins"))
///     .build()?;
/// let startup = service.start().await;
/// if let Some(e) = &startup.load_error {
///     eprintln!("{}", e.user_message());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SignatureService {
    settings: Settings,
    bootstrap: Arc<SignatureProviderBootstrap>,
    registry: Arc<PluginRegistry>,
    pipeline: HookPipeline,
}

impl SignatureService {
    pub fn builder() -> SignatureServiceBuilder {
        SignatureServiceBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bootstrap(&self) -> &SignatureProviderBootstrap {
        &self.bootstrap
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &HookPipeline {
        &self.pipeline
    }

    /// Configures the signature provider, then loads the installed plugins.
    pub async fn start(&self) -> StartupReport {
        let bootstrap = self.bootstrap.configure().await.clone();

        let (plugins, load_error) = match self.registry.load_installed().await {
            Ok(plugins) => (plugins, None),
            Err(e) => {
                tracing::error!(error = %e, "Could not load installed plugins");
                (Vec::new(), Some(Error::from(e)))
            }
        };

        tracing::info!(
            plugins = plugins.len(),
            provider = bootstrap
                .active_provider
                .as_ref()
                .map(|p| p.name.as_str())
                .unwrap_or("none"),
            "Signature service started"
        );
        StartupReport {
            bootstrap,
            plugins,
            load_error,
        }
    }

    pub async fn installed_plugins(&self) -> Result<Vec<PluginHandle>> {
        Ok(self.registry.installed().await?)
    }

    pub async fn validate_plugin(&self, bundle: &Path) -> Result<PluginHandle> {
        Ok(self
            .registry
            .validate(bundle)
            .await
            .map_err(PluginError::from)?)
    }

    /// Validates and installs the bundle at `bundle`.
    pub async fn import_plugin(&self, bundle: &Path) -> Result<PluginHandle> {
        let plugin = self.validate_plugin(bundle).await.inspect_err(|e| {
            tracing::warn!(path = %bundle.display(), error = %e, "Rejected plugin bundle");
        })?;
        self.registry.install(bundle, plugin.clone()).await?;
        Ok(plugin)
    }

    pub async fn remove_plugin(&self, plugin: &PluginHandle) -> Result<()> {
        Ok(self.registry.uninstall(plugin).await?)
    }

    pub async fn sign(
        &self,
        request: SigningRequest,
        signer: &dyn Signer,
    ) -> Result<SignedDocument> {
        Ok(self.pipeline.sign(request, signer).await?)
    }
}

impl std::fmt::Debug for SignatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureService")
            .field("settings", &self.settings)
            .field("bootstrap", &self.bootstrap)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
