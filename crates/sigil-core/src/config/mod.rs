//! Configuration types for Sigil.
//!
//! Configuration is read from a single YAML file (`sigil.yaml`):
//!
//! ```yaml
//! keys:
//!   rsa_key_bits: 2048
//!   system_key_version: "1"
//!   system_private_key_file: keys/system.pem
//! tokens:
//!   system_token_ttl: 12h
//!   permission_token_ttl: 100s
//!   leeway_seconds: 5
//! ```

pub mod keys;
pub mod tokens;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use keys::KeyConfig;
pub use tokens::TokenConfig;

/// Complete Sigil configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigilConfig {
    /// Key material settings.
    #[serde(default)]
    pub keys: KeyConfig,

    /// Token lifetime settings.
    #[serde(default)]
    pub tokens: TokenConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid duration '{value}' for {field}: {source}")]
    Duration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SigilConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting that cannot be expressed in the type system.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keys.validate().map_err(ConfigError::Config)?;
        self.tokens.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = SigilConfig::from_yaml("{}").unwrap();
        assert_eq!(config.keys.rsa_key_bits, 2048);
        assert_eq!(config.keys.system_key_version, "1");
        assert_eq!(config.tokens.leeway_seconds, 0);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
keys:
  rsa_key_bits: 4096
  system_key_version: "2024_01"
tokens:
  system_token_ttl: 1h
  permission_token_ttl: 30s
  max_token_lifetime: 1d
  leeway_seconds: 5
"#;
        let config = SigilConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.keys.rsa_key_bits, 4096);
        assert_eq!(config.keys.system_key_version, "2024_01");
        assert_eq!(config.tokens.system_token_ttl().unwrap(), Duration::from_secs(3600));
        assert_eq!(config.tokens.permission_token_ttl().unwrap(), Duration::from_secs(30));
        assert_eq!(config.tokens.leeway_seconds, 5);
    }

    #[test]
    fn test_invalid_config_rejected_on_load() {
        let yaml = "keys:\n  rsa_key_bits: 512\n";
        assert!(matches!(
            SigilConfig::from_yaml(yaml),
            Err(ConfigError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sigil.yaml");
        fs::write(&path, "tokens:\n  user_token_ttl: 2h\n").unwrap();

        let config = SigilConfig::from_file(&path).unwrap();
        assert_eq!(config.tokens.user_token_ttl().unwrap(), Duration::from_secs(7200));
    }
}
