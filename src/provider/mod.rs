//! XML-signature provider bootstrap.
//!
//! Signatures must come out byte-stable whichever security provider the
//! host has. Before the first signing operation the bootstrap:
//!
//! 1. remembers the provider currently resolved for the `DOM` mechanism,
//! 2. turns on both Base64 line-break suppression switches,
//! 3. installs the known-good provider at the highest priority (primary
//!    implementation first, legacy implementation second),
//! 4. re-resolves, reinstalling the remembered provider if nothing resolves.
//!
//! Every failure is absorbed into a [`BootstrapWarning`]; the bootstrap
//! itself never fails.

mod bootstrap;
mod catalog;
mod table;

pub use bootstrap::{
    BootstrapReport, BootstrapWarning, CANONICAL_PROVIDER_NAME, IGNORE_LINE_BREAKS_SWITCH,
    InstallStrategy, LEGACY_IMPLEMENTATION, LINE_FEED_ONLY_SWITCH, PRIMARY_IMPLEMENTATION,
    SIGNATURE_MECHANISM, SUPERSEDED_PROVIDER_NAME, SignatureProviderBootstrap,
};
pub use catalog::ImplementationCatalog;
pub use table::{InMemoryProviderTable, ProviderTable, SecurityProvider};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("No provider available for mechanism '{mechanism}'")]
    NoSuchMechanism { mechanism: String },

    #[error("Provider implementation not found: {implementation}")]
    UnknownImplementation { implementation: String },

    #[error("Failed to instantiate provider {implementation}: {message}")]
    Instantiation {
        implementation: String,
        message: String,
    },

    #[error("Provider '{name}' is already registered")]
    AlreadyRegistered { name: String },

    #[error("Provider resolution failed: {0}")]
    Resolution(String),
}
