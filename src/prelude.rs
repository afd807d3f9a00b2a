//! Prelude module for convenient imports.
//!
//! ```rust
//! use xmlsign_plugins::prelude::*;
//! ```

pub use crate::Error;
pub use crate::Result;

pub use crate::config::{PropertyStore, PropertyStoreExt, Settings, SettingsLoader};
pub use crate::pipeline::{SignedDocument, Signer, SignerError, SignerOutput, SigningRequest};
pub use crate::plugins::{
    Certificate, Plugin, PluginDescriptor, PluginFailure, PluginHandle, SignatureFormat,
};
pub use crate::service::SignatureService;
