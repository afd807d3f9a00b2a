//! One-time configuration of the XML-signature provider.

use std::sync::Arc;

use tokio::sync::OnceCell;

use super::{ImplementationCatalog, ProviderError, ProviderTable, SecurityProvider};
use crate::config::{PropertyStore, PropertyStoreExt};

/// Mechanism the XML-signature factory is resolved for.
pub const SIGNATURE_MECHANISM: &str = "DOM";

/// Registration name of the known-good provider.
pub const CANONICAL_PROVIDER_NAME: &str = "ApacheXMLDSig";

/// Registration name the known-good provider replaces.
pub const SUPERSEDED_PROVIDER_NAME: &str = "XMLDSig";

/// Honored by library builds that predate [`IGNORE_LINE_BREAKS_SWITCH`].
pub const LINE_FEED_ONLY_SWITCH: &str = "com.sun.org.apache.xml.internal.security.lineFeedOnly";

pub const IGNORE_LINE_BREAKS_SWITCH: &str = "org.apache.xml.security.ignoreLineBreaks";

pub const PRIMARY_IMPLEMENTATION: &str = "org.apache.jcp.xml.dsig.internal.dom.XMLDSigRI";

pub const LEGACY_IMPLEMENTATION: &str = "org.jcp.xml.dsig.internal.dom.XMLDSigRI";

/// Non-fatal problem met while bootstrapping. Logged and kept in the
/// [`BootstrapReport`]; never returned as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapWarning {
    #[error("No default provider for XML signatures: {message}")]
    DefaultUnresolved { message: String },

    #[error("Could not set switch {switch}: {message}")]
    SwitchNotSet { switch: String, message: String },

    #[error("Could not install provider {implementation}: {message}")]
    InstallFailed {
        implementation: String,
        message: String,
    },

    #[error("No provider installed for XML signatures, default reinstalled: {message}")]
    DefaultRestored { message: String },

    #[error("Error verifying XML signature providers: {message}")]
    Verification { message: String },
}

/// Outcome of the single bootstrap run.
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    /// Provider active before bootstrap ran.
    pub default_provider: Option<SecurityProvider>,
    /// Provider resolved after bootstrap ran.
    pub active_provider: Option<SecurityProvider>,
    /// Implementation installed by this run, if any.
    pub installed: Option<String>,
    pub warnings: Vec<BootstrapWarning>,
}

impl BootstrapReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, warning: BootstrapWarning) {
        tracing::warn!(warning = %warning, "Provider bootstrap step failed");
        self.warnings.push(warning);
    }
}

/// An implementation to try installing, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStrategy {
    pub implementation: String,
}

impl InstallStrategy {
    pub fn new(implementation: impl Into<String>) -> Self {
        Self {
            implementation: implementation.into(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(PRIMARY_IMPLEMENTATION),
            Self::new(LEGACY_IMPLEMENTATION),
        ]
    }
}

/// Configures the signature provider at most once per instance.
///
/// Construct one per process and share it; concurrent callers of
/// [`configure`](Self::configure) wait for the single run and observe the
/// same report.
pub struct SignatureProviderBootstrap {
    table: Arc<dyn ProviderTable>,
    properties: Arc<dyn PropertyStore>,
    catalog: ImplementationCatalog,
    strategies: Vec<InstallStrategy>,
    state: OnceCell<BootstrapReport>,
}

impl SignatureProviderBootstrap {
    pub fn new(
        table: Arc<dyn ProviderTable>,
        properties: Arc<dyn PropertyStore>,
        catalog: ImplementationCatalog,
    ) -> Self {
        Self {
            table,
            properties,
            catalog,
            strategies: InstallStrategy::defaults(),
            state: OnceCell::new(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<InstallStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.state.initialized()
    }

    pub fn report(&self) -> Option<&BootstrapReport> {
        self.state.get()
    }

    pub fn default_provider(&self) -> Option<&SecurityProvider> {
        self.state.get().and_then(|r| r.default_provider.as_ref())
    }

    /// Runs the bootstrap on first call; later calls return the first
    /// run's report without touching the provider table.
    pub async fn configure(&self) -> &BootstrapReport {
        self.state.get_or_init(|| self.run()).await
    }

    async fn run(&self) -> BootstrapReport {
        let mut report = BootstrapReport::default();

        match self.table.resolve(SIGNATURE_MECHANISM).await {
            Ok(provider) => report.default_provider = Some(provider),
            Err(e) => report.warn(BootstrapWarning::DefaultUnresolved {
                message: e.to_string(),
            }),
        }

        for switch in [LINE_FEED_ONLY_SWITCH, IGNORE_LINE_BREAKS_SWITCH] {
            if let Err(e) = self.properties.set_bool(switch, true).await {
                report.warn(BootstrapWarning::SwitchNotSet {
                    switch: switch.to_string(),
                    message: e.to_string(),
                });
            }
        }

        if self.table.provider(CANONICAL_PROVIDER_NAME).await.is_none() {
            for strategy in &self.strategies {
                match self.install(&strategy.implementation).await {
                    Ok(installed) => {
                        self.table.remove(SUPERSEDED_PROVIDER_NAME).await;
                        if installed {
                            report.installed = Some(strategy.implementation.clone());
                        }
                        break;
                    }
                    Err(e) => report.warn(BootstrapWarning::InstallFailed {
                        implementation: strategy.implementation.clone(),
                        message: e.to_string(),
                    }),
                }
            }
        }

        match self.table.resolve(SIGNATURE_MECHANISM).await {
            Ok(provider) => {
                tracing::info!(
                    provider = %provider.name,
                    implementation = %provider.implementation,
                    "Using XML signature provider"
                );
                report.active_provider = Some(provider);
            }
            Err(e @ ProviderError::NoSuchMechanism { .. }) => {
                report.warn(BootstrapWarning::DefaultRestored {
                    message: e.to_string(),
                });
                if let Some(default) = report.default_provider.clone() {
                    self.table.add(default.clone()).await;
                    report.active_provider = Some(default);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Error verifying XML signature providers");
                report.warnings.push(BootstrapWarning::Verification {
                    message: e.to_string(),
                });
            }
        }

        report
    }

    /// Returns `Ok(false)` when the implementation is already registered.
    async fn install(&self, implementation: &str) -> Result<bool, ProviderError> {
        let already = self
            .table
            .providers()
            .await
            .iter()
            .any(|p| p.implementation == implementation);
        if already {
            return Ok(false);
        }

        let provider = self.catalog.instantiate(implementation)?;
        tracing::info!(
            provider = %provider.name,
            implementation = %provider.implementation,
            "Installing XML signature provider"
        );
        let name = provider.name.clone();
        self.table
            .insert_at(provider, 1)
            .await
            .map(|_| true)
            .ok_or(ProviderError::AlreadyRegistered { name })
    }
}

impl std::fmt::Debug for SignatureProviderBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureProviderBootstrap")
            .field("strategies", &self.strategies)
            .field("configured", &self.is_configured())
            .finish()
    }
}
