//! Token lifetime configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ConfigError;

/// Lifetimes and validation tolerances for issued tokens.
///
/// Durations are humantime strings such as `"12h"`, `"30m"` or `"100s"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Lifetime of system tokens.
    #[serde(default = "default_system_token_ttl")]
    pub system_token_ttl: String,

    /// Lifetime of "everything" user tokens.
    #[serde(default = "default_user_token_ttl")]
    pub user_token_ttl: String,

    /// Lifetime of single-permission user tokens.
    #[serde(default = "default_permission_token_ttl")]
    pub permission_token_ttl: String,

    /// Upper bound any serializer accepts for a token lifetime.
    #[serde(default)]
    pub max_token_lifetime: Option<String>,

    /// Clock skew tolerated when checking `exp`, in seconds.
    #[serde(default)]
    pub leeway_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            system_token_ttl: default_system_token_ttl(),
            user_token_ttl: default_user_token_ttl(),
            permission_token_ttl: default_permission_token_ttl(),
            max_token_lifetime: None,
            leeway_seconds: 0,
        }
    }
}

impl TokenConfig {
    pub fn system_token_ttl(&self) -> Result<Duration, ConfigError> {
        parse_ttl("tokens.system_token_ttl", &self.system_token_ttl)
    }

    pub fn user_token_ttl(&self) -> Result<Duration, ConfigError> {
        parse_ttl("tokens.user_token_ttl", &self.user_token_ttl)
    }

    pub fn permission_token_ttl(&self) -> Result<Duration, ConfigError> {
        parse_ttl("tokens.permission_token_ttl", &self.permission_token_ttl)
    }

    pub fn max_token_lifetime(&self) -> Result<Option<Duration>, ConfigError> {
        self.max_token_lifetime
            .as_deref()
            .map(|s| parse_ttl("tokens.max_token_lifetime", s))
            .transpose()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let max = self.max_token_lifetime()?;
        for ttl in [
            self.system_token_ttl()?,
            self.user_token_ttl()?,
            self.permission_token_ttl()?,
        ] {
            if let Some(max) = max {
                if ttl > max {
                    return Err(ConfigError::Config(format!(
                        "token lifetime {} exceeds tokens.max_token_lifetime {}",
                        humantime::format_duration(ttl),
                        humantime::format_duration(max)
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_ttl(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let ttl = humantime::parse_duration(value.trim()).map_err(|source| ConfigError::Duration {
        field,
        value: value.to_string(),
        source,
    })?;
    if ttl.is_zero() {
        return Err(ConfigError::Config(format!("{field} must be positive")));
    }
    Ok(ttl)
}

fn default_system_token_ttl() -> String {
    "12h".to_string()
}

fn default_user_token_ttl() -> String {
    "10h".to_string()
}

fn default_permission_token_ttl() -> String {
    "100s".to_string()
}
