//! Tenant tokens: user credentials carrying explicit permission grants.

use crate::claims::TokenClaims;
use crate::content::TokenContent;
use crate::error::TokenError;
use crate::keys::{KeyPairHolder, ensure_signing_strength};
use crate::token::{Token, expiry, require, sign};
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;
use sigil_core::constants::TENANT_ISSUER;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Everything needed to mint one tenant token.
///
/// Tenant, user, content, lifetime and private key are required. Use
/// [`TenantTokenSpecification::key_pair`] to take tenant, key and key
/// version from the tenant's current key pair.
#[derive(Clone, Default)]
pub struct TenantTokenSpecification {
    tenant: Option<String>,
    user: Option<String>,
    content: Option<TokenContent>,
    seconds_to_live: Option<i64>,
    private_key: Option<RsaPrivateKey>,
    key_version: Option<String>,
    issued_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for TenantTokenSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantTokenSpecification")
            .field("tenant", &self.tenant)
            .field("user", &self.user)
            .field("content", &self.content)
            .field("seconds_to_live", &self.seconds_to_live)
            .field("key_version", &self.key_version)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

impl TenantTokenSpecification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign with `key_pair`, on behalf of its tenant.
    pub fn key_pair(mut self, key_pair: &KeyPairHolder) -> Self {
        self.tenant = Some(key_pair.tenant().to_string());
        self.private_key = Some(key_pair.private_key().clone());
        self.key_version = Some(key_pair.version().to_string());
        self
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn token_content(mut self, content: TokenContent) -> Self {
        self.content = Some(content);
        self
    }

    /// Grant every operation on every path of each application.
    pub fn everything<S: AsRef<str>>(self, applications: &[S]) -> Self {
        self.token_content(TokenContent::everything(applications))
    }

    pub fn seconds_to_live(mut self, seconds: i64) -> Self {
        self.seconds_to_live = Some(seconds);
        self
    }

    pub fn private_key(mut self, private_key: RsaPrivateKey) -> Self {
        self.private_key = Some(private_key);
        self
    }

    pub fn key_version(mut self, version: impl Into<String>) -> Self {
        self.key_version = Some(version.into());
        self
    }

    /// Override the issue time (defaults to now).
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }
}

/// Signs tenant tokens.
#[derive(Debug, Clone, Default)]
pub struct TenantTokenSerializer {
    max_lifetime: Option<Duration>,
}

impl TenantTokenSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse specifications that ask for a longer lifetime.
    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = Some(max_lifetime);
        self
    }

    /// Validate `spec` and sign it.
    pub fn build(&self, spec: TenantTokenSpecification) -> Result<Token, TokenError> {
        let tenant = require(spec.tenant, "tenant")?;
        let user = require(spec.user, "user")?;
        let content = require(spec.content, "token content")?;
        let seconds_to_live = require(spec.seconds_to_live, "seconds to live")?;
        let private_key = require(spec.private_key, "private key")?;

        if user.trim().is_empty() {
            return Err(TokenError::InvalidSpecification(
                "user must not be empty".to_string(),
            ));
        }

        let issued_at = spec.issued_at.unwrap_or_else(Utc::now).timestamp();
        let max = self
            .max_lifetime
            .map(|max| i64::try_from(max.as_secs()).unwrap_or(i64::MAX));
        let exp = expiry(issued_at, seconds_to_live, max)?;
        ensure_signing_strength(&private_key)?;

        let claims = TokenClaims {
            sub: user,
            iss: TENANT_ISSUER.to_string(),
            tid: tenant,
            aud: None,
            iat: issued_at,
            exp,
            jti: Uuid::new_v4().to_string(),
            role: None,
            content: Some(content.to_claim()?),
        };

        let token = sign(&claims, spec.key_version.as_deref(), &private_key)?;
        tracing::debug!(
            tenant = %claims.tid,
            user = %claims.sub,
            grants = content.permissions().len(),
            expires = exp,
            "issued tenant token"
        );
        Ok(token)
    }
}
