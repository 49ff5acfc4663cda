//! Permission grants embedded in tenant tokens.
//!
//! A [`TokenPermission`] scopes a set of [`AllowedOperation`]s to a path
//! made of an application name followed by a URI pattern, e.g.
//! `office-v1/accounts/{id}`. A trailing `*` segment covers every sub-path.
//!
//! When several grants match the same path their operations are merged
//! (union). Nothing prevents duplicate paths; callers should avoid them.

use crate::error::TokenError;
use serde::{Deserialize, Serialize};
use sigil_core::constants::CONTENT_FORMAT_VERSION;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Operation a grant allows on its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllowedOperation {
    Read,
    Change,
    Delete,
}

impl AllowedOperation {
    /// Every operation.
    pub fn all() -> BTreeSet<Self> {
        BTreeSet::from([Self::Read, Self::Change, Self::Delete])
    }

    /// Map an HTTP method to the operation it performs.
    pub fn from_http_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Some(Self::Read),
            "POST" | "PUT" | "PATCH" => Some(Self::Change),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for AllowedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "READ",
            Self::Change => "CHANGE",
            Self::Delete => "DELETE",
        })
    }
}

impl FromStr for AllowedOperation {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(Self::Read),
            "CHANGE" => Ok(Self::Change),
            "DELETE" => Ok(Self::Delete),
            other => Err(TokenError::InvalidSpecification(format!(
                "unknown operation '{other}'"
            ))),
        }
    }
}

/// One grant: a scope path and the operations allowed on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenPermission {
    path: String,
    allowed_operations: BTreeSet<AllowedOperation>,
}

impl TokenPermission {
    pub fn new(path: impl Into<String>, operations: impl IntoIterator<Item = AllowedOperation>) -> Self {
        Self {
            path: path.into(),
            allowed_operations: operations.into_iter().collect(),
        }
    }

    /// All operations under `application/*`.
    pub fn everything(application: &str) -> Self {
        Self::new(format!("{application}/*"), AllowedOperation::all())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn allowed_operations(&self) -> &BTreeSet<AllowedOperation> {
        &self.allowed_operations
    }

    /// Whether this grant's path covers the concrete request path `path`.
    pub fn covers(&self, path: &str) -> bool {
        path_matches(&self.path, path)
    }

    /// Whether this grant covers every path the endpoint pattern `endpoint` accepts.
    pub fn covers_pattern(&self, endpoint: &str) -> bool {
        pattern_covers(&self.path, endpoint)
    }
}

/// Ordered list of grants carried by a tenant token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenContent {
    permissions: Vec<TokenPermission>,
}

#[derive(Serialize)]
struct ContentEnvelopeRef<'a> {
    version: u32,
    permissions: &'a [TokenPermission],
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ContentEnvelope {
    version: u32,
    permissions: Vec<TokenPermission>,
}

impl TokenContent {
    pub fn new(permissions: Vec<TokenPermission>) -> Self {
        Self { permissions }
    }

    /// Every operation on every path of each named application.
    pub fn everything<S: AsRef<str>>(applications: &[S]) -> Self {
        Self::new(
            applications
                .iter()
                .map(|application| TokenPermission::everything(application.as_ref()))
                .collect(),
        )
    }

    /// Exactly one operation on exactly one URI of one application.
    pub fn one_permission(application: &str, uri: &str, operation: AllowedOperation) -> Self {
        Self::new(vec![TokenPermission::new(scope_path(application, uri), [operation])])
    }

    pub fn permissions(&self) -> &[TokenPermission] {
        &self.permissions
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Union of the operations every matching grant allows on `application` + `uri`.
    pub fn operations_for(&self, application: &str, uri: &str) -> BTreeSet<AllowedOperation> {
        let path = scope_path(application, uri);
        self.permissions
            .iter()
            .filter(|permission| permission.covers(&path))
            .flat_map(|permission| permission.allowed_operations.iter().copied())
            .collect()
    }

    /// Whether `operation` is granted on `application` + `uri`.
    pub fn authorizes(&self, application: &str, uri: &str, operation: AllowedOperation) -> bool {
        self.operations_for(application, uri).contains(&operation)
    }

    /// Serialize into the opaque string carried by the `content` claim.
    pub fn to_claim(&self) -> Result<String, TokenError> {
        serde_json::to_string(&ContentEnvelopeRef {
            version: CONTENT_FORMAT_VERSION,
            permissions: &self.permissions,
        })
        .map_err(|e| TokenError::SerializationError(e.to_string()))
    }

    /// Parse a `content` claim, rejecting unknown format versions.
    pub fn from_claim(claim: &str) -> Result<Self, TokenError> {
        let envelope: ContentEnvelope =
            serde_json::from_str(claim).map_err(|e| TokenError::SerializationError(e.to_string()))?;
        if envelope.version != CONTENT_FORMAT_VERSION {
            return Err(TokenError::SerializationError(format!(
                "unsupported content format version {}",
                envelope.version
            )));
        }
        Ok(Self::new(envelope.permissions))
    }
}

/// Join an application name and a URI into a scope path.
pub fn scope_path(application: &str, uri: &str) -> String {
    format!("{}/{}", application.trim_end_matches('/'), uri.trim_start_matches('/'))
}

/// Segment-wise match of `pattern` against the concrete `path`.
///
/// Only the pattern side is interpreted: `{param}` matches any single
/// segment, `*` matches one segment or, as the last segment, any remainder.
/// Segments of `path` are always compared literally.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    segments_match(pattern, path, segment_matches)
}

/// Whether every path accepted by `endpoint` is also accepted by `grant`.
///
/// A literal grant segment never covers an endpoint `{param}` or `*`.
pub fn pattern_covers(grant: &str, endpoint: &str) -> bool {
    segments_match(grant, endpoint, segment_covers)
}

fn segments_match(pattern: &str, target: &str, matches: fn(&str, &str) -> bool) -> bool {
    let pattern: Vec<&str> = segments(pattern).collect();
    let target: Vec<&str> = segments(target).collect();

    for (i, expected) in pattern.iter().enumerate() {
        if *expected == "*" && i == pattern.len() - 1 {
            return true;
        }
        match target.get(i) {
            Some(actual) if matches(expected, actual) => {}
            _ => return false,
        }
    }

    pattern.len() == target.len()
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn segment_matches(expected: &str, actual: &str) -> bool {
    expected == "*" || expected == actual || is_param(expected)
}

fn segment_covers(grant: &str, endpoint: &str) -> bool {
    match endpoint {
        "*" => grant == "*",
        _ if is_param(endpoint) => grant == "*" || is_param(grant),
        _ => segment_matches(grant, endpoint),
    }
}

fn is_param(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}
