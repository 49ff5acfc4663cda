//! Application identity (`name-version`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The identity of a service in the mesh, e.g. `office-v1`.
///
/// System tokens are minted for exactly one `ApplicationName` and only
/// validate against an authenticator configured with the same one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationName {
    name: String,
    version: String,
}

/// Failure to parse a `name-version` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid application name '{input}': expected <name>-v<version>")]
pub struct ParseApplicationNameError {
    input: String,
}

impl ApplicationName {
    /// Create an application name from its parts.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// The bare service name, without version.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version suffix, e.g. `v1`.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ApplicationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

impl FromStr for ApplicationName {
    type Err = ParseApplicationNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseApplicationNameError {
            input: s.to_string(),
        };

        let (name, version) = s.rsplit_once('-').ok_or_else(err)?;
        let mut chars = version.chars();
        let well_formed = chars.next() == Some('v')
            && chars.next().is_some_and(|c| c.is_ascii_digit())
            && !name.is_empty();

        if !well_formed {
            return Err(err());
        }

        Ok(Self::new(name, version))
    }
}

impl TryFrom<String> for ApplicationName {
    type Error = ParseApplicationNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApplicationName> for String {
    fn from(value: ApplicationName) -> Self {
        value.to_string()
    }
}
