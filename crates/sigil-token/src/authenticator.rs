//! Token verification at the service boundary.
//!
//! Both authenticators return a uniform [`AuthenticationError::NotAuthenticated`]
//! for every verification failure. The concrete reason is logged at `warn`
//! and never handed back to the caller. Key store outages are the exception:
//! they surface as [`AuthenticationError::KeyStoreUnavailable`] so callers can
//! retry instead of treating the token as bad.

use crate::claims::TokenClaims;
use crate::content::{AllowedOperation, TokenContent};
use crate::error::{AuthenticationError, TokenError};
use crate::provider::SystemKeyProvider;
use crate::registry::{ApplicationPermission, PermittableEndpoints, TokenType};
use crate::store::PublicKeyLookup;
use crate::token::{Expectations, decode_verified, strip_bearer};
use chrono::{DateTime, Utc};
use sigil_core::ApplicationName;
use sigil_core::constants::{SYSTEM_ISSUER, TENANT_ISSUER};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A caller whose token passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    user: String,
    tenant: String,
    token_type: TokenType,
    role: Option<String>,
    permissions: BTreeSet<ApplicationPermission>,
    content: Option<TokenContent>,
    expires_at: DateTime<Utc>,
}

impl ValidatedIdentity {
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Administrative role (system tokens only).
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Endpoints of the authenticating application this identity may use.
    ///
    /// System tokens get every endpoint registered for system tokens. Tenant
    /// tokens get the registered tenant endpoints their grants fully cover.
    pub fn permissions(&self) -> &BTreeSet<ApplicationPermission> {
        &self.permissions
    }

    /// Grants carried by a tenant token.
    pub fn content(&self) -> Option<&TokenContent> {
        self.content.as_ref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the identity may perform `operation` on `application` + `uri`.
    ///
    /// The request must hit a permitted endpoint and, for tenant tokens, the
    /// concrete `uri` must also be granted by the token itself.
    pub fn permits(&self, application: &str, uri: &str, operation: AllowedOperation) -> bool {
        self.permissions
            .iter()
            .any(|permission| permission.allows(application, uri, operation))
            && self
                .content
                .as_ref()
                .is_none_or(|content| content.authorizes(application, uri, operation))
    }
}

/// Verifies system tokens minted for this service.
pub struct SystemAuthenticator {
    keys: Arc<dyn SystemKeyProvider>,
    application: ApplicationName,
    endpoints: Arc<dyn PermittableEndpoints>,
    leeway: u64,
}

impl SystemAuthenticator {
    pub fn new(
        keys: Arc<dyn SystemKeyProvider>,
        application: ApplicationName,
        endpoints: Arc<dyn PermittableEndpoints>,
    ) -> Self {
        Self {
            keys,
            application,
            endpoints,
            leeway: 0,
        }
    }

    /// Clock skew tolerated on expiry and issue time, in seconds.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    pub fn application(&self) -> &ApplicationName {
        &self.application
    }

    /// Verify `raw_token` as a system token issued to `expected_user`.
    ///
    /// The key version comes from `key_version_hint` if given, otherwise from
    /// the token header. A hint that contradicts the header is rejected.
    pub fn authenticate(
        &self,
        expected_user: &str,
        raw_token: &str,
        key_version_hint: Option<&str>,
    ) -> Result<ValidatedIdentity, AuthenticationError> {
        self.verify(None, expected_user, raw_token, key_version_hint)
            .map_err(|e| rejected(TokenType::System, expected_user, e))
    }

    /// Like [`authenticate`](Self::authenticate), but the token must also
    /// have been issued for `tenant`.
    pub fn authenticate_for_tenant(
        &self,
        tenant: &str,
        expected_user: &str,
        raw_token: &str,
        key_version_hint: Option<&str>,
    ) -> Result<ValidatedIdentity, AuthenticationError> {
        self.verify(Some(tenant), expected_user, raw_token, key_version_hint)
            .map_err(|e| rejected(TokenType::System, expected_user, e))
    }

    fn verify(
        &self,
        expected_tenant: Option<&str>,
        expected_user: &str,
        raw_token: &str,
        key_version_hint: Option<&str>,
    ) -> Result<ValidatedIdentity, TokenError> {
        let jwt = strip_bearer(raw_token)
            .ok_or_else(|| TokenError::TokenParseFailed("missing bearer prefix".to_string()))?;
        let header = jsonwebtoken::decode_header(jwt)
            .map_err(|e| TokenError::TokenParseFailed(e.to_string()))?;

        let version = match (key_version_hint, header.kid.as_deref()) {
            (Some(hint), Some(kid)) if hint != kid => {
                return Err(TokenError::VerificationFailed(format!(
                    "key version hint {hint} does not match token key version {kid}"
                )));
            }
            (Some(version), _) | (None, Some(version)) => version,
            (None, None) => {
                return Err(TokenError::VerificationFailed(
                    "no key version available".to_string(),
                ));
            }
        };

        let public_key = match self.keys.public_key(version) {
            Ok(key) => key,
            Err(TokenError::InvalidKeyVersion { version }) => {
                return Err(TokenError::VerificationFailed(format!(
                    "unknown system key version {version}"
                )));
            }
            Err(e) => return Err(TokenError::KeyStoreUnavailable(e.to_string())),
        };

        let audience = self.application.to_string();
        let claims = decode_verified(
            jwt,
            &public_key,
            &Expectations {
                issuer: SYSTEM_ISSUER,
                audience: Some(&audience),
                leeway: self.leeway,
            },
        )?;
        check_subject(&claims, expected_user)?;
        if let Some(tenant) = expected_tenant {
            check_tenant(&claims, tenant)?;
        }

        let role = claims
            .role
            .clone()
            .ok_or_else(|| TokenError::VerificationFailed("system token carries no role".to_string()))?;

        let identity = ValidatedIdentity {
            user: claims.sub.clone(),
            tenant: claims.tid.clone(),
            token_type: TokenType::System,
            role: Some(role),
            permissions: registered_endpoints(
                self.endpoints.as_ref(),
                TokenType::System,
                &self.application,
            )
            .collect(),
            content: None,
            expires_at: claims.expires_at(),
        };
        tracing::debug!(
            tenant = %identity.tenant,
            application = %self.application,
            "system token accepted"
        );
        Ok(identity)
    }
}

/// Verifies tenant tokens against the issuing tenant's keys.
pub struct TenantAuthenticator {
    keys: Arc<dyn PublicKeyLookup>,
    application: ApplicationName,
    endpoints: Arc<dyn PermittableEndpoints>,
    leeway: u64,
}

impl TenantAuthenticator {
    pub fn new(
        keys: Arc<dyn PublicKeyLookup>,
        application: ApplicationName,
        endpoints: Arc<dyn PermittableEndpoints>,
    ) -> Self {
        Self {
            keys,
            application,
            endpoints,
            leeway: 0,
        }
    }

    /// Clock skew tolerated on expiry and issue time, in seconds.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    pub fn application(&self) -> &ApplicationName {
        &self.application
    }

    /// Verify `raw_token` as a tenant token of `tenant` issued to `expected_user`.
    pub fn authenticate(
        &self,
        tenant: &str,
        expected_user: &str,
        raw_token: &str,
    ) -> Result<ValidatedIdentity, AuthenticationError> {
        self.verify(tenant, expected_user, raw_token)
            .map_err(|e| rejected(TokenType::Tenant, expected_user, e))
    }

    fn verify(
        &self,
        tenant: &str,
        expected_user: &str,
        raw_token: &str,
    ) -> Result<ValidatedIdentity, TokenError> {
        let jwt = strip_bearer(raw_token)
            .ok_or_else(|| TokenError::TokenParseFailed("missing bearer prefix".to_string()))?;
        let header = jsonwebtoken::decode_header(jwt)
            .map_err(|e| TokenError::TokenParseFailed(e.to_string()))?;
        let version = header
            .kid
            .ok_or_else(|| TokenError::VerificationFailed("token names no key version".to_string()))?;

        let public_key = self
            .keys
            .lookup(tenant, &version)
            .map_err(|e| TokenError::KeyStoreUnavailable(e.to_string()))?
            .ok_or_else(|| {
                TokenError::VerificationFailed(format!(
                    "no key version {version} for tenant {tenant}"
                ))
            })?;

        let claims = decode_verified(
            jwt,
            &public_key,
            &Expectations {
                issuer: TENANT_ISSUER,
                audience: None,
                leeway: self.leeway,
            },
        )?;
        check_subject(&claims, expected_user)?;
        check_tenant(&claims, tenant)?;

        let content = claims
            .content
            .as_deref()
            .ok_or_else(|| TokenError::VerificationFailed("tenant token carries no content".to_string()))
            .and_then(TokenContent::from_claim)?;

        let permissions = registered_endpoints(self.endpoints.as_ref(), TokenType::Tenant, &self.application)
            .filter(|endpoint| {
                content.permissions().iter().any(|grant| {
                    grant.covers_pattern(&endpoint.path)
                        && grant.allowed_operations().contains(&endpoint.operation)
                })
            })
            .collect();

        tracing::debug!(tenant, user = %claims.sub, "tenant token accepted");
        Ok(ValidatedIdentity {
            user: claims.sub.clone(),
            tenant: claims.tid.clone(),
            token_type: TokenType::Tenant,
            role: None,
            permissions,
            content: Some(content),
            expires_at: claims.expires_at(),
        })
    }
}

fn check_subject(claims: &TokenClaims, expected_user: &str) -> Result<(), TokenError> {
    if claims.sub != expected_user {
        return Err(TokenError::VerificationFailed(format!(
            "token subject {} is not {expected_user}",
            claims.sub
        )));
    }
    Ok(())
}

fn check_tenant(claims: &TokenClaims, tenant: &str) -> Result<(), TokenError> {
    if claims.tid != tenant {
        return Err(TokenError::VerificationFailed(format!(
            "token issued for tenant {}",
            claims.tid
        )));
    }
    Ok(())
}

/// Endpoints the registry declares for `token_type` on `application`.
fn registered_endpoints(
    endpoints: &dyn PermittableEndpoints,
    token_type: TokenType,
    application: &ApplicationName,
) -> impl Iterator<Item = ApplicationPermission> {
    let application = application.to_string();
    endpoints
        .permittable_endpoints(token_type)
        .into_iter()
        .filter(move |endpoint| endpoint.application() == application)
}

fn rejected(token_type: TokenType, user: &str, error: TokenError) -> AuthenticationError {
    match error {
        TokenError::KeyStoreUnavailable(reason) => {
            tracing::error!(%token_type, user, %reason, "key store unavailable during authentication");
            AuthenticationError::KeyStoreUnavailable(reason)
        }
        other => {
            tracing::warn!(%token_type, user, reason = %other, "token rejected");
            AuthenticationError::NotAuthenticated
        }
    }
}
