//! System tokens: short-lived administrative credentials for one target service.

use crate::claims::TokenClaims;
use crate::error::TokenError;
use crate::keys::ensure_signing_strength;
use crate::token::{Token, expiry, require, sign};
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;
use sigil_core::ApplicationName;
use sigil_core::constants::{SYSTEM_ISSUER, SYSTEM_SU};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Everything needed to mint one system token.
///
/// All fields except `key_version` and `issued_at` are required.
#[derive(Clone, Default)]
pub struct SystemTokenSpecification {
    tenant: Option<String>,
    role: Option<String>,
    seconds_to_live: Option<i64>,
    private_key: Option<RsaPrivateKey>,
    key_version: Option<String>,
    target_application: Option<ApplicationName>,
    issued_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for SystemTokenSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTokenSpecification")
            .field("tenant", &self.tenant)
            .field("role", &self.role)
            .field("seconds_to_live", &self.seconds_to_live)
            .field("key_version", &self.key_version)
            .field("target_application", &self.target_application)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

impl SystemTokenSpecification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn seconds_to_live(mut self, seconds: i64) -> Self {
        self.seconds_to_live = Some(seconds);
        self
    }

    pub fn private_key(mut self, private_key: RsaPrivateKey) -> Self {
        self.private_key = Some(private_key);
        self
    }

    /// Key version announced in the token header.
    pub fn key_version(mut self, version: impl Into<String>) -> Self {
        self.key_version = Some(version.into());
        self
    }

    pub fn target_application(mut self, application: ApplicationName) -> Self {
        self.target_application = Some(application);
        self
    }

    /// Override the issue time (defaults to now).
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }
}

/// Signs system tokens.
#[derive(Debug, Clone, Default)]
pub struct SystemTokenSerializer {
    max_lifetime: Option<Duration>,
}

impl SystemTokenSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse specifications that ask for a longer lifetime.
    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = Some(max_lifetime);
        self
    }

    /// Validate `spec` and sign it.
    pub fn build(&self, spec: SystemTokenSpecification) -> Result<Token, TokenError> {
        let tenant = require(spec.tenant, "tenant")?;
        let role = require(spec.role, "role")?;
        let seconds_to_live = require(spec.seconds_to_live, "seconds to live")?;
        let private_key = require(spec.private_key, "private key")?;
        let target = require(spec.target_application, "target application")?;

        let issued_at = spec.issued_at.unwrap_or_else(Utc::now).timestamp();
        let max = self
            .max_lifetime
            .map(|max| i64::try_from(max.as_secs()).unwrap_or(i64::MAX));
        let exp = expiry(issued_at, seconds_to_live, max)?;
        ensure_signing_strength(&private_key)?;

        let claims = TokenClaims {
            sub: SYSTEM_SU.to_string(),
            iss: SYSTEM_ISSUER.to_string(),
            tid: tenant,
            aud: Some(target.to_string()),
            iat: issued_at,
            exp,
            jti: Uuid::new_v4().to_string(),
            role: Some(role),
            content: None,
        };

        let token = sign(&claims, spec.key_version.as_deref(), &private_key)?;
        tracing::debug!(
            tenant = %claims.tid,
            application = %target,
            expires = exp,
            "issued system token"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_keys::{ROOT, WEAK};
    use crate::token::inspect_token_unverified;
    use sigil_core::constants::SYSTEM_ADMIN_ROLE;

    fn spec() -> SystemTokenSpecification {
        SystemTokenSpecification::new()
            .tenant("acme")
            .role(SYSTEM_ADMIN_ROLE)
            .seconds_to_live(60)
            .private_key(ROOT.private_key().clone())
            .key_version("1")
            .target_application(ApplicationName::new("office", "v1"))
    }

    #[test]
    fn test_build_system_token() {
        let token = SystemTokenSerializer::new().build(spec()).unwrap();
        assert!(token.as_str().starts_with("Bearer "));

        let info = inspect_token_unverified(token.as_str()).unwrap();
        assert_eq!(info.key_version.as_deref(), Some("1"));
        assert_eq!(info.claims.sub, SYSTEM_SU);
        assert_eq!(info.claims.iss, SYSTEM_ISSUER);
        assert_eq!(info.claims.tid, "acme");
        assert_eq!(info.claims.aud.as_deref(), Some("office-v1"));
        assert_eq!(info.claims.role.as_deref(), Some(SYSTEM_ADMIN_ROLE));
        assert_eq!(info.claims.exp - info.claims.iat, 60);
        assert!(info.claims.content.is_none());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let serializer = SystemTokenSerializer::new();
        let incomplete = SystemTokenSpecification::new()
            .tenant("acme")
            .seconds_to_live(60)
            .private_key(ROOT.private_key().clone());

        let err = serializer.build(incomplete).unwrap_err();
        assert!(matches!(err, TokenError::InvalidSpecification(_)));
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let serializer = SystemTokenSerializer::new();
        assert!(serializer.build(spec().seconds_to_live(0)).is_err());
        assert!(serializer.build(spec().seconds_to_live(-1)).is_err());
    }

    #[test]
    fn test_max_lifetime_enforced() {
        let serializer = SystemTokenSerializer::new().with_max_lifetime(Duration::from_secs(30));
        assert!(matches!(
            serializer.build(spec()),
            Err(TokenError::InvalidSpecification(_))
        ));
        assert!(serializer.build(spec().seconds_to_live(30)).is_ok());
    }

    #[test]
    fn test_weak_key_rejected() {
        let result = SystemTokenSerializer::new().build(spec().private_key(WEAK.clone()));
        assert!(matches!(result, Err(TokenError::InvalidPrivateKey(_))));
    }

    #[test]
    fn test_identical_specs_produce_distinct_tokens() {
        let serializer = SystemTokenSerializer::new();
        let now = Utc::now();
        let first = serializer.build(spec().issued_at(now)).unwrap();
        let second = serializer.build(spec().issued_at(now)).unwrap();
        let later = serializer
            .build(spec().issued_at(now + chrono::Duration::seconds(1)))
            .unwrap();

        assert_ne!(first, second);
        assert_ne!(first, later);
    }
}
