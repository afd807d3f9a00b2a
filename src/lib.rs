//! # xmlsign-plugins
//!
//! Plugin lifecycle, signing hook pipeline and XML-signature provider
//! bootstrap for a digital-signature application.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use xmlsign_plugins::prelude::*;
//!
//! struct Stamp(PluginDescriptor);
//!
//! #[async_trait]
//! impl Plugin for Stamp {
//!     fn descriptor(&self) -> &PluginDescriptor {
//!         &self.0
//!     }
//! }
//!
//! # async fn example(signer: &dyn Signer) -> Result<()> {
//! let service = SignatureService::builder()
//!     .settings(SettingsLoader::new().load("settings.json").await?)
//!     .entry_point("stamp.Stamp", |d| Arc::new(Stamp(d)) as Arc<dyn Plugin>)
//!     .build()?;
//!
//! service.start().await;
//! service.import_plugin("stamp.sigplugin".as_ref()).await?;
//!
//! let signed = service
//!     .sign(SigningRequest::new(b"<doc/>".to_vec(), "XAdES"), signer)
//!     .await?;
//! println!("{} bytes", signed.signature.len());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod pipeline;
pub mod plugins;
pub mod prelude;
pub mod provider;
pub mod service;

pub use config::{
    ConfigError, EnvProperties, MemoryProperties, PropertyStore, PropertyStoreExt, Settings,
    SettingsLoader,
};
pub use pipeline::{
    HookPipeline, HookStage, PipelineError, PipelineState, SignedDocument, Signer, SignerError,
    SignerOutput, SigningRequest, SigningRun,
};
pub use plugins::{
    BundleManifest, Certificate, DetailKind, DetailSection, InstallLayout, Plugin,
    PluginDescriptor, PluginError, PluginFailure, PluginHandle, PluginIdentity, PluginLoader,
    PluginRegistry, SignatureFormat, ValidationFailure,
};
pub use provider::{
    BootstrapReport, BootstrapWarning, ImplementationCatalog, InMemoryProviderTable,
    InstallStrategy, ProviderError, ProviderTable, SecurityProvider, SignatureProviderBootstrap,
};
pub use service::{SignatureService, SignatureServiceBuilder, StartupReport};

/// Error type for xmlsign-plugins operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider table or implementation failure.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Plugin validation, installation or removal failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// A signing operation was aborted.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// How the caller should surface an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Show [`Error::user_message`] to the user.
    UserFacing,
    /// Filesystem failure; show a generic message and log the detail.
    Storage,
    /// Unexpected failure; log it.
    Internal,
}

const INTERNAL_MESSAGE: &str = "An unexpected error occurred";

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Plugin(e) | Error::Pipeline(PipelineError::Registry(e)) => match e {
                PluginError::Storage { .. } | PluginError::RegistryLoad { .. } => {
                    ErrorCategory::Storage
                }
                _ => ErrorCategory::UserFacing,
            },
            Error::Pipeline(PipelineError::Aborted { .. } | PipelineError::HookTimeout { .. }) => {
                ErrorCategory::UserFacing
            }
            Error::Pipeline(PipelineError::Signer(_)) => ErrorCategory::Internal,
            Error::Config(_) | Error::Provider(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_user_facing(&self) -> bool {
        self.category() == ErrorCategory::UserFacing
    }

    /// Message to show the end user. Plugin-reported failures carry the
    /// plugin's own text.
    pub fn user_message(&self) -> String {
        match self {
            Error::Plugin(e) => e.user_message(),
            Error::Pipeline(e) => e.user_message(),
            Error::Config(_) | Error::Provider(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

impl From<ValidationFailure> for Error {
    fn from(err: ValidationFailure) -> Self {
        Error::Plugin(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
