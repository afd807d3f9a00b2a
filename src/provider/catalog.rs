//! Constructible provider implementations, keyed by implementation id.

use std::sync::Arc;

use dashmap::DashMap;

use super::{ProviderError, SecurityProvider};

type ProviderFactory = Arc<dyn Fn() -> Result<SecurityProvider, ProviderError> + Send + Sync>;

/// Implementations the host knows how to construct.
///
/// Looking up an id that was never registered behaves like a missing
/// implementation on the host: [`ProviderError::UnknownImplementation`].
#[derive(Clone, Default)]
pub struct ImplementationCatalog {
    factories: Arc<DashMap<String, ProviderFactory>>,
}

impl ImplementationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, implementation: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<SecurityProvider, ProviderError> + Send + Sync + 'static,
    {
        self.factories
            .insert(implementation.into(), Arc::new(factory));
    }

    pub fn with<F>(self, implementation: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<SecurityProvider, ProviderError> + Send + Sync + 'static,
    {
        self.register(implementation, factory);
        self
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }

    pub fn instantiate(&self, implementation: &str) -> Result<SecurityProvider, ProviderError> {
        // The factory must not run while a shard lock is held.
        let factory = self
            .factories
            .get(implementation)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| ProviderError::UnknownImplementation {
                implementation: implementation.to_string(),
            })?;
        factory()
    }
}

impl std::fmt::Debug for ImplementationCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        f.debug_struct("ImplementationCatalog")
            .field("implementations", &ids)
            .finish()
    }
}
