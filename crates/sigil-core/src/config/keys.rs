//! Signing key configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::MIN_RSA_KEY_BITS;

/// Configuration for RSA key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Modulus size for generated tenant keys.
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,

    /// Version advertised for the root authority key (`kid` of system tokens).
    #[serde(default = "default_system_key_version")]
    pub system_key_version: String,

    /// Environment variable containing the root public key (PEM).
    #[serde(default)]
    pub system_public_key_env: Option<String>,

    /// Path to the root public key file (PEM).
    #[serde(default)]
    pub system_public_key_file: Option<PathBuf>,

    /// Environment variable containing the root private key (PEM).
    #[serde(default)]
    pub system_private_key_env: Option<String>,

    /// Path to the root private key file (PEM).
    #[serde(default)]
    pub system_private_key_file: Option<PathBuf>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            rsa_key_bits: default_rsa_key_bits(),
            system_key_version: default_system_key_version(),
            system_public_key_env: None,
            system_public_key_file: None,
            system_private_key_env: None,
            system_private_key_file: None,
        }
    }
}

impl KeyConfig {
    /// Resolve the root public key from environment or file.
    pub fn resolve_public_key(&self) -> Result<Option<String>, std::io::Error> {
        resolve(&self.system_public_key_env, &self.system_public_key_file)
    }

    /// Resolve the root private key from environment or file.
    pub fn resolve_private_key(&self) -> Result<Option<String>, std::io::Error> {
        resolve(&self.system_private_key_env, &self.system_private_key_file)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(format!(
                "keys.rsa_key_bits must be at least {MIN_RSA_KEY_BITS}, got {}",
                self.rsa_key_bits
            ));
        }
        if self.system_key_version.trim().is_empty() {
            return Err("keys.system_key_version must not be empty".to_string());
        }
        Ok(())
    }
}

fn resolve(env: &Option<String>, file: &Option<PathBuf>) -> Result<Option<String>, std::io::Error> {
    // Environment wins over file
    if let Some(env_var) = env {
        if let Ok(key) = std::env::var(env_var) {
            return Ok(Some(key));
        }
    }

    if let Some(path) = file {
        if path.exists() {
            let key = std::fs::read_to_string(path)?;
            return Ok(Some(key.trim().to_string()));
        }
    }

    Ok(None)
}

fn default_rsa_key_bits() -> usize {
    MIN_RSA_KEY_BITS
}

fn default_system_key_version() -> String {
    "1".to_string()
}
