//! Ordered table of installed security providers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ProviderError;

/// A security provider registered with the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityProvider {
    /// Canonical registration name, unique within a table.
    pub name: String,
    /// Identifier of the implementation that backs this provider.
    pub implementation: String,
    /// Mechanisms this provider can perform (e.g. `DOM`).
    #[serde(default)]
    pub mechanisms: Vec<String>,
}

impl SecurityProvider {
    pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            mechanisms: Vec::new(),
        }
    }

    pub fn with_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.mechanisms.push(mechanism.into());
        self
    }

    pub fn supports(&self, mechanism: &str) -> bool {
        self.mechanisms.iter().any(|m| m == mechanism)
    }
}

/// Host-wide provider registration, in priority order.
///
/// Positions are 1-based; position 1 is the most preferred provider.
#[async_trait::async_trait]
pub trait ProviderTable: Send + Sync {
    async fn providers(&self) -> Vec<SecurityProvider>;

    async fn provider(&self, name: &str) -> Option<SecurityProvider> {
        self.providers().await.into_iter().find(|p| p.name == name)
    }

    /// Insert at `position`, shifting later providers down. Returns the
    /// position actually used, or `None` if the name is already registered.
    async fn insert_at(&self, provider: SecurityProvider, position: usize) -> Option<usize>;

    /// Append with the lowest priority.
    async fn add(&self, provider: SecurityProvider) -> Option<usize>;

    async fn remove(&self, name: &str) -> bool;

    /// Highest-priority provider that supports `mechanism`.
    async fn resolve(&self, mechanism: &str) -> Result<SecurityProvider, ProviderError> {
        self.providers()
            .await
            .into_iter()
            .find(|p| p.supports(mechanism))
            .ok_or_else(|| ProviderError::NoSuchMechanism {
                mechanism: mechanism.to_string(),
            })
    }
}

/// In-process provider table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProviderTable {
    providers: Arc<RwLock<Vec<SecurityProvider>>>,
}

impl InMemoryProviderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_providers(providers: Vec<SecurityProvider>) -> Self {
        Self {
            providers: Arc::new(RwLock::new(providers)),
        }
    }

    pub async fn names(&self) -> Vec<String> {
        self.providers
            .read()
            .await
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl ProviderTable for InMemoryProviderTable {
    async fn providers(&self) -> Vec<SecurityProvider> {
        self.providers.read().await.clone()
    }

    async fn insert_at(&self, provider: SecurityProvider, position: usize) -> Option<usize> {
        let mut providers = self.providers.write().await;
        if providers.iter().any(|p| p.name == provider.name) {
            return None;
        }
        let index = position.saturating_sub(1).min(providers.len());
        providers.insert(index, provider);
        Some(index + 1)
    }

    async fn add(&self, provider: SecurityProvider) -> Option<usize> {
        let mut providers = self.providers.write().await;
        if providers.iter().any(|p| p.name == provider.name) {
            return None;
        }
        providers.push(provider);
        Some(providers.len())
    }

    async fn remove(&self, name: &str) -> bool {
        let mut providers = self.providers.write().await;
        let before = providers.len();
        providers.retain(|p| p.name != name);
        providers.len() != before
    }
}
