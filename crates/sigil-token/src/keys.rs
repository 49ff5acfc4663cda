//! RSA key material.

use crate::error::TokenError;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sigil_core::constants::MIN_RSA_KEY_BITS;
use std::fmt;
use std::path::Path;

/// An RSA key pair owned by one tenant (or the root authority) under one key version.
///
/// Holders are immutable once created. Rotation produces a new holder with a
/// new version instead of mutating an existing one.
#[derive(Clone)]
pub struct KeyPairHolder {
    tenant: String,
    version: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl fmt::Debug for KeyPairHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairHolder")
            .field("tenant", &self.tenant)
            .field("version", &self.version)
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

impl KeyPairHolder {
    /// Generate a new random key pair.
    pub fn generate(
        tenant: impl Into<String>,
        version: impl Into<String>,
        bits: usize,
    ) -> Result<Self, TokenError> {
        let private_key = generate_private_key(bits)?;
        Ok(Self::from_private_key(tenant, version, private_key))
    }

    /// Create a holder from an existing private key.
    pub fn from_private_key(
        tenant: impl Into<String>,
        version: impl Into<String>,
        private_key: RsaPrivateKey,
    ) -> Self {
        let public_key = private_key.to_public_key();
        Self {
            tenant: tenant.into(),
            version: version.into(),
            private_key,
            public_key,
        }
    }

    /// Load a holder from a PEM-encoded private key (PKCS#1 or PKCS#8).
    pub fn from_private_key_pem(
        tenant: impl Into<String>,
        version: impl Into<String>,
        pem: &str,
    ) -> Result<Self, TokenError> {
        let private_key = load_private_key_pem(pem)?;
        Ok(Self::from_private_key(tenant, version, private_key))
    }

    /// Load a holder from a private key file.
    pub fn load_from_file(
        tenant: impl Into<String>,
        version: impl Into<String>,
        private_key_path: &Path,
    ) -> Result<Self, TokenError> {
        let pem = std::fs::read_to_string(private_key_path)?;
        Self::from_private_key_pem(tenant, version, pem.trim())
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public_key.size() * 8
    }

    /// Get the private key as a PKCS#1 PEM string.
    pub fn private_key_pem(&self) -> Result<String, TokenError> {
        let pem = self
            .private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| TokenError::InvalidPrivateKey(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Get the public key as a PKCS#1 PEM string.
    pub fn public_key_pem(&self) -> Result<String, TokenError> {
        self.public_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| TokenError::InvalidPublicKey(e.to_string()))
    }

    /// Save the key pair to files.
    pub fn save_to_files(
        &self,
        private_key_path: &Path,
        public_key_path: &Path,
    ) -> Result<(), TokenError> {
        std::fs::write(private_key_path, self.private_key_pem()?)?;
        std::fs::write(public_key_path, self.public_key_pem()?)?;
        Ok(())
    }
}

/// Generate an RSA private key of at least [`MIN_RSA_KEY_BITS`].
pub fn generate_private_key(bits: usize) -> Result<RsaPrivateKey, TokenError> {
    if bits < MIN_RSA_KEY_BITS {
        return Err(TokenError::KeyGenerationFailed(format!(
            "{bits}-bit keys are below the {MIN_RSA_KEY_BITS}-bit minimum"
        )));
    }
    RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| TokenError::KeyGenerationFailed(e.to_string()))
}

/// Load a private key from PEM (PKCS#1 or PKCS#8).
pub fn load_private_key_pem(pem: &str) -> Result<RsaPrivateKey, TokenError> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| TokenError::InvalidPrivateKey(e.to_string()))
}

/// Load a public key from PEM (PKCS#1 or SubjectPublicKeyInfo).
pub fn load_public_key_pem(pem: &str) -> Result<RsaPublicKey, TokenError> {
    RsaPublicKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
        .map_err(|e| TokenError::InvalidPublicKey(e.to_string()))
}

/// Load a public key from a file.
pub fn load_public_key_file(path: &Path) -> Result<RsaPublicKey, TokenError> {
    let pem = std::fs::read_to_string(path)?;
    load_public_key_pem(pem.trim())
}

/// Reject private keys too weak to sign with.
pub(crate) fn ensure_signing_strength(private_key: &RsaPrivateKey) -> Result<(), TokenError> {
    let bits = private_key.size() * 8;
    if bits < MIN_RSA_KEY_BITS {
        return Err(TokenError::InvalidPrivateKey(format!(
            "{bits}-bit key is below the {MIN_RSA_KEY_BITS}-bit minimum"
        )));
    }
    Ok(())
}

pub(crate) fn encoding_key(private_key: &RsaPrivateKey) -> Result<EncodingKey, TokenError> {
    let der = private_key
        .to_pkcs1_der()
        .map_err(|e| TokenError::InvalidPrivateKey(e.to_string()))?;
    Ok(EncodingKey::from_rsa_der(der.as_bytes()))
}

pub(crate) fn decoding_key(public_key: &RsaPublicKey) -> Result<DecodingKey, TokenError> {
    let der = public_key
        .to_pkcs1_der()
        .map_err(|e| TokenError::InvalidPublicKey(e.to_string()))?;
    Ok(DecodingKey::from_rsa_der(der.as_bytes()))
}


#[cfg(test)]
mod tests {
    use super::test_keys::{ROOT, WEAK};
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generated_key_meets_minimum() {
        assert_eq!(ROOT.bits(), 2048);
        assert_eq!(ROOT.tenant(), "system");
        assert_eq!(ROOT.version(), "1");
    }

    #[test]
    fn test_small_key_generation_refused() {
        let err = KeyPairHolder::generate("acme", "1", 1024).unwrap_err();
        assert!(matches!(err, TokenError::KeyGenerationFailed(_)));
    }

    #[test]
    fn test_pem_roundtrip() {
        let pem = ROOT.private_key_pem().unwrap();
        let loaded = KeyPairHolder::from_private_key_pem("system", "1", &pem).unwrap();
        assert_eq!(loaded.public_key(), ROOT.public_key());

        let public = load_public_key_pem(&ROOT.public_key_pem().unwrap()).unwrap();
        assert_eq!(&public, ROOT.public_key());
    }

    #[test]
    fn test_file_save_load() {
        let dir = tempdir().unwrap();
        let private_path = dir.path().join("private.pem");
        let public_path = dir.path().join("public.pem");

        ROOT.save_to_files(&private_path, &public_path).unwrap();

        let loaded = KeyPairHolder::load_from_file("system", "1", &private_path).unwrap();
        assert_eq!(loaded.public_key(), ROOT.public_key());
        assert_eq!(&load_public_key_file(&public_path).unwrap(), ROOT.public_key());
    }

    #[test]
    fn test_garbage_pem_rejected() {
        assert!(matches!(
            load_private_key_pem("not a key"),
            Err(TokenError::InvalidPrivateKey(_))
        ));
        assert!(matches!(
            load_public_key_pem("not a key"),
            Err(TokenError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_weak_key_refused_for_signing() {
        assert!(ensure_signing_strength(&WEAK).is_err());
        assert!(ensure_signing_strength(ROOT.private_key()).is_ok());
    }
}
