//! Endpoints that accept a given kind of token.

use crate::content::{AllowedOperation, path_matches, scope_path};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Kind of token, carried in the `iss` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    System,
    Tenant,
}

impl TokenType {
    pub fn issuer(self) -> &'static str {
        match self {
            Self::System => sigil_core::constants::SYSTEM_ISSUER,
            Self::Tenant => sigil_core::constants::TENANT_ISSUER,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.issuer())
    }
}

/// One `(path, operation)` pair an endpoint accepts.
///
/// `path` is a scope path (`application/uri`) and may contain `{param}` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationPermission {
    pub path: String,
    pub operation: AllowedOperation,
}

impl ApplicationPermission {
    pub fn new(path: impl Into<String>, operation: AllowedOperation) -> Self {
        Self {
            path: path.into(),
            operation,
        }
    }

    /// Application the endpoint belongs to, the first segment of `path`.
    pub fn application(&self) -> &str {
        self.path
            .split('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or_default()
    }

    /// Whether this permission allows `operation` on `application` + `uri`.
    pub fn allows(&self, application: &str, uri: &str, operation: AllowedOperation) -> bool {
        self.operation == operation && path_matches(&self.path, &scope_path(application, uri))
    }
}

/// Read-only registry of the endpoints that accept each token type.
pub trait PermittableEndpoints: Send + Sync {
    fn permittable_endpoints(&self, token_type: TokenType) -> HashSet<ApplicationPermission>;
}

/// Registry populated up front.
#[derive(Debug, Clone, Default)]
pub struct StaticPermittableEndpoints {
    endpoints: HashMap<TokenType, HashSet<ApplicationPermission>>,
}

impl StaticPermittableEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `token_type` tokens may perform `operation` on `application` + `uri`.
    pub fn permit(
        mut self,
        token_type: TokenType,
        application: &str,
        uri: &str,
        operation: AllowedOperation,
    ) -> Self {
        self.endpoints
            .entry(token_type)
            .or_default()
            .insert(ApplicationPermission::new(scope_path(application, uri), operation));
        self
    }
}

impl PermittableEndpoints for StaticPermittableEndpoints {
    fn permittable_endpoints(&self, token_type: TokenType) -> HashSet<ApplicationPermission> {
        self.endpoints.get(&token_type).cloned().unwrap_or_default()
    }
}
