//! Named configuration switches shared by the whole process.
//!
//! The XML-signature library reads its behavior switches (line-break
//! handling in Base64 content, for instance) from a property store. The
//! bootstrap writes them here once; nothing in this crate reads them back.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{ConfigError, ConfigResult};

/// String-valued property store.
#[async_trait::async_trait]
pub trait PropertyStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> ConfigResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> ConfigResult<()>;

    async fn remove(&self, key: &str) -> ConfigResult<bool>;
}

/// Typed accessors on top of [`PropertyStore`].
pub trait PropertyStoreExt: PropertyStore {
    fn get_bool(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = ConfigResult<Option<bool>>> + Send
    where
        Self: Sync,
    {
        async move {
            match self.get(key).await? {
                Some(raw) => raw
                    .trim()
                    .parse::<bool>()
                    .map(Some)
                    .map_err(|e| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: e.to_string(),
                    }),
                None => Ok(None),
            }
        }
    }

    fn set_bool(
        &self,
        key: &str,
        value: bool,
    ) -> impl std::future::Future<Output = ConfigResult<()>> + Send
    where
        Self: Sync,
    {
        async move { self.set(key, if value { "true" } else { "false" }).await }
    }
}

impl<P: PropertyStore + ?Sized> PropertyStoreExt for P {}

/// In-memory property store, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct MemoryProperties {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: HashMap<String, String>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl PropertyStore for MemoryProperties {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> ConfigResult<Option<String>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> ConfigResult<()> {
        self.data
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> ConfigResult<bool> {
        Ok(self.data.write().await.remove(key).is_some())
    }
}
