//! Signing hook pipeline.
//!
//! One signing operation moves through
//! `Idle -> PreProcessing -> Signing -> PostProcessing -> Done`, or ends in
//! `Aborted` as soon as a hook or the signer fails.

mod executor;
mod run;
mod signer;

use std::time::Duration;

pub use executor::{HookPipeline, SignedDocument};
pub use run::{HookStage, PipelineState, SigningRun, Transition};
pub use signer::{Signer, SignerError, SignerOutput, SigningRequest};

use crate::plugins::{PluginError, PluginFailure, PluginIdentity};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Signing aborted by plugin {plugin} during {stage}: {source}")]
    Aborted {
        stage: HookStage,
        plugin: PluginIdentity,
        #[source]
        source: PluginFailure,
    },

    #[error("Plugin {plugin} did not finish {stage} within {timeout:?}")]
    HookTimeout {
        stage: HookStage,
        plugin: PluginIdentity,
        timeout: Duration,
    },

    #[error("Signature step failed: {0}")]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Registry(#[from] PluginError),
}

impl PipelineError {
    /// The plugin that stopped the operation, if one did.
    pub fn plugin(&self) -> Option<&PluginIdentity> {
        match self {
            PipelineError::Aborted { plugin, .. } | PipelineError::HookTimeout { plugin, .. } => {
                Some(plugin)
            }
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Aborted { source, .. } => source.message().to_string(),
            PipelineError::HookTimeout { plugin, .. } => format!(
                "The plugin {} did not respond and the signature was cancelled",
                plugin.internal_name
            ),
            PipelineError::Signer(_) => "The signature could not be created".into(),
            PipelineError::Registry(e) => e.user_message(),
        }
    }
}
