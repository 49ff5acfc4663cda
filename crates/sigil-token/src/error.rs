//! Error types for the token crate.

use thiserror::Error;

/// Errors that can occur while managing keys or minting tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Failed to generate a key pair.
    #[error("failed to generate key pair: {0}")]
    KeyGenerationFailed(String),

    /// Failed to parse or use a private key.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Failed to parse or use a public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A token specification is incomplete or violates its contract.
    #[error("invalid token specification: {0}")]
    InvalidSpecification(String),

    /// Signing the claims failed.
    #[error("failed to sign token: {0}")]
    SigningFailed(String),

    /// Failed to parse a token.
    #[error("failed to parse token: {0}")]
    TokenParseFailed(String),

    /// Token failed cryptographic or claim verification.
    #[error("token verification failed: {0}")]
    VerificationFailed(String),

    /// The requested key version is not known.
    #[error("invalid key version: {version}")]
    InvalidKeyVersion { version: String },

    /// The key store could not be reached.
    #[error("key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    /// Failed to serialize/deserialize claims or content.
    #[error("token serialization error: {0}")]
    SerializationError(String),

    /// IO error (reading/writing keys).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Outcome of a failed authentication.
///
/// Every verification failure collapses into [`AuthenticationError::NotAuthenticated`];
/// the reason is logged, never returned. Only an unreachable key store is
/// reported separately because the caller may retry it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("key store unavailable: {0}")]
    KeyStoreUnavailable(String),
}

impl AuthenticationError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::KeyStoreUnavailable(_))
    }
}
