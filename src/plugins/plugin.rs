//! The plugin capability and its identity-based handle.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::descriptor::{PluginDescriptor, PluginIdentity};

/// Failure reported by a plugin's own code. The message is meant for the
/// end user and is passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PluginFailure {
    message: String,
}

impl PluginFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Signature format applied to the data being signed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureFormat {
    XAdES,
    CAdES,
    PAdES,
    FacturaE,
    Other(String),
}

impl SignatureFormat {
    pub fn as_str(&self) -> &str {
        match self {
            SignatureFormat::XAdES => "XAdES",
            SignatureFormat::CAdES => "CAdES",
            SignatureFormat::PAdES => "PAdES",
            SignatureFormat::FacturaE => "FacturaE",
            SignatureFormat::Other(name) => name,
        }
    }
}

impl From<&str> for SignatureFormat {
    fn from(value: &str) -> Self {
        match value {
            "XAdES" => SignatureFormat::XAdES,
            "CAdES" => SignatureFormat::CAdES,
            "PAdES" => SignatureFormat::PAdES,
            "FacturaE" => SignatureFormat::FacturaE,
            other => SignatureFormat::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DER-encoded certificate from the chain used to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

/// Extension point loaded from a plugin bundle.
///
/// Every hook has a default: lifecycle hooks do nothing and the signing
/// hooks return their input unchanged.
///
/// # Example
///
/// ```rust,no_run
/// use xmlsign_plugins::plugins::{Plugin, PluginDescriptor, PluginFailure, SignatureFormat};
/// use async_trait::async_trait;
///
/// struct RejectEmpty {
///     descriptor: PluginDescriptor,
/// }
///
/// #[async_trait]
/// impl Plugin for RejectEmpty {
///     fn descriptor(&self) -> &PluginDescriptor {
///         &self.descriptor
///     }
///
///     async fn pre_sign(&self, data: Vec<u8>, _format: &SignatureFormat)
///         -> Result<Vec<u8>, PluginFailure>
///     {
///         if data.is_empty() {
///             return Err(PluginFailure::new("There is nothing to sign"));
///         }
///         Ok(data)
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    /// Runs once, when the plugin is installed.
    async fn install(&self) -> Result<(), PluginFailure> {
        Ok(())
    }

    /// Runs once, when the plugin is removed. Should undo anything
    /// `install` or the signing hooks left behind.
    async fn uninstall(&self) -> Result<(), PluginFailure> {
        Ok(())
    }

    /// Transforms the data before it is signed.
    async fn pre_sign(
        &self,
        data: Vec<u8>,
        _format: &SignatureFormat,
    ) -> Result<Vec<u8>, PluginFailure> {
        Ok(data)
    }

    /// Transforms the produced signature.
    async fn post_sign(
        &self,
        signature: Vec<u8>,
        _format: &SignatureFormat,
        _cert_chain: &[Certificate],
    ) -> Result<Vec<u8>, PluginFailure> {
        Ok(signature)
    }

    /// Runs after every signing operation, completed or aborted.
    async fn reset(&self) {}
}

/// Shared handle to a loaded plugin.
///
/// Equality and hashing use only [`PluginIdentity`]: two handles to distinct
/// loaded instances with the same name and version code compare equal.
#[derive(Clone)]
pub struct PluginHandle {
    inner: Arc<dyn Plugin>,
}

impl PluginHandle {
    pub fn new<P: Plugin + 'static>(plugin: P) -> Self {
        Self {
            inner: Arc::new(plugin),
        }
    }

    pub fn from_arc(plugin: Arc<dyn Plugin>) -> Self {
        Self { inner: plugin }
    }

    pub fn identity(&self) -> PluginIdentity {
        self.inner.descriptor().identity()
    }
}

impl Deref for PluginHandle {
    type Target = dyn Plugin;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl PartialEq for PluginHandle {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.descriptor(), other.descriptor());
        a.internal_name() == b.internal_name() && a.version_code() == b.version_code()
    }
}

impl Eq for PluginHandle {}

impl Hash for PluginHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor().internal_name().hash(state);
        self.descriptor().version_code().hash(state);
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("identity", &self.identity())
            .finish()
    }
}

impl fmt::Display for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.descriptor(), f)
    }
}
