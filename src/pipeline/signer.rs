use async_trait::async_trait;

use crate::plugins::{Certificate, SignatureFormat};

/// Data to sign and the format to sign it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pub data: Vec<u8>,
    pub format: SignatureFormat,
}

impl SigningRequest {
    pub fn new(data: impl Into<Vec<u8>>, format: impl Into<SignatureFormat>) -> Self {
        Self {
            data: data.into(),
            format: format.into(),
        }
    }
}

/// What the cryptographic signer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerOutput {
    pub signature: Vec<u8>,
    pub cert_chain: Vec<Certificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SignerError {
    message: String,
}

impl SignerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The underlying cryptographic signature step.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        data: &[u8],
        format: &SignatureFormat,
    ) -> Result<SignerOutput, SignerError>;
}
