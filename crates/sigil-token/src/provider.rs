//! Source of the root (system) verification keys.

use crate::error::TokenError;
use rsa::RsaPublicKey;
use std::collections::HashMap;

/// Resolves the public key that verifies system tokens of a given key version.
pub trait SystemKeyProvider: Send + Sync {
    /// Fails with [`TokenError::InvalidKeyVersion`] for unknown versions.
    /// Any other error means the backing store is unavailable.
    fn public_key(&self, key_version: &str) -> Result<RsaPublicKey, TokenError>;
}

/// Version to key map held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSystemKeyProvider {
    keys: HashMap<String, RsaPublicKey>,
}

impl StaticSystemKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key_version: impl Into<String>, public_key: RsaPublicKey) -> Self {
        self.keys.insert(key_version.into(), public_key);
        self
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl SystemKeyProvider for StaticSystemKeyProvider {
    fn public_key(&self, key_version: &str) -> Result<RsaPublicKey, TokenError> {
        self.keys
            .get(key_version)
            .cloned()
            .ok_or_else(|| TokenError::InvalidKeyVersion {
                version: key_version.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_keys::{OTHER, ROOT};

    #[test]
    fn test_known_and_unknown_versions() {
        let provider = StaticSystemKeyProvider::new()
            .with_key("1", ROOT.public_key().clone())
            .with_key("2", OTHER.public_key().clone());

        assert_eq!(&provider.public_key("1").unwrap(), ROOT.public_key());
        assert_eq!(&provider.public_key("2").unwrap(), OTHER.public_key());

        let err = provider.public_key("3").unwrap_err();
        assert!(matches!(err, TokenError::InvalidKeyVersion { version } if version == "3"));
    }
}
