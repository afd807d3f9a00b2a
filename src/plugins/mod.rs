//! Plugin lifecycle: validation, installation, ordered registry, removal.
//!
//! A plugin bundle is a JSON manifest whose `entryPoint` names a factory
//! registered with the [`PluginLoader`]. Installed bundles are copied into
//! one directory per identity, and `installed.json` keeps the installation
//! order across restarts.
//!
//! # Directory Structure
//!
//! ```text
//! <plugins_dir>/
//! ├── installed.json
//! └── sign-audit-3/
//!     └── sign-audit.sigplugin
//! ```

mod descriptor;
mod error;
mod layout;
mod loader;
mod manifest;
mod plugin;
mod registry;

pub use descriptor::{DetailKind, DetailSection, PluginDescriptor, PluginIdentity};
pub use error::{PluginError, ValidationFailure};
pub use layout::{INDEX_FILE, IndexEntry, InstallLayout};
pub use loader::PluginLoader;
pub use manifest::BundleManifest;
pub use plugin::{Certificate, Plugin, PluginFailure, PluginHandle, SignatureFormat};
pub use registry::PluginRegistry;
