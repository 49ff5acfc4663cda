//! Token strings, signing and unverified inspection.

use crate::claims::TokenClaims;
use crate::content::TokenContent;
use crate::error::TokenError;
use crate::keys::{decoding_key, encoding_key};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::{Algorithm, Header, Validation};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sigil_core::constants::BEARER_PREFIX;
use std::fmt;

/// Signature algorithm of every Sigil token.
pub const ALGORITHM: Algorithm = Algorithm::RS512;

/// A signed token as presented on the wire: `"Bearer " + <compact JWS>`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub(crate) fn from_jwt(jwt: String) -> Self {
        Self(format!("{BEARER_PREFIX}{jwt}"))
    }

    /// The full token, prefix included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The compact JWS without the bearer prefix.
    pub fn jwt(&self) -> &str {
        &self.0[BEARER_PREFIX.len()..]
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token([REDACTED])")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strip the bearer prefix. `None` if it is absent or nothing follows it.
pub fn strip_bearer(token: &str) -> Option<&str> {
    let jwt = token.strip_prefix(BEARER_PREFIX)?.trim();
    (!jwt.is_empty()).then_some(jwt)
}

/// Check a requested lifetime and compute the expiry.
pub(crate) fn expiry(
    issued_at: i64,
    seconds_to_live: i64,
    max_seconds_to_live: Option<i64>,
) -> Result<i64, TokenError> {
    if seconds_to_live <= 0 {
        return Err(TokenError::InvalidSpecification(format!(
            "seconds to live must be positive, got {seconds_to_live}"
        )));
    }
    if let Some(max) = max_seconds_to_live {
        if seconds_to_live > max {
            return Err(TokenError::InvalidSpecification(format!(
                "seconds to live {seconds_to_live} exceeds the maximum of {max}"
            )));
        }
    }
    issued_at
        .checked_add(seconds_to_live)
        .ok_or_else(|| TokenError::InvalidSpecification("expiry out of range".to_string()))
}

pub(crate) fn require<T>(value: Option<T>, field: &str) -> Result<T, TokenError> {
    value.ok_or_else(|| TokenError::InvalidSpecification(format!("{field} is required")))
}

pub(crate) fn sign(
    claims: &TokenClaims,
    key_version: Option<&str>,
    private_key: &RsaPrivateKey,
) -> Result<Token, TokenError> {
    let mut header = Header::new(ALGORITHM);
    header.kid = key_version.map(str::to_string);

    let key = encoding_key(private_key)?;
    let jwt = jsonwebtoken::encode(&header, claims, &key)
        .map_err(|e| TokenError::SigningFailed(e.to_string()))?;
    Ok(Token::from_jwt(jwt))
}

/// What a verified token must assert besides a valid signature.
pub(crate) struct Expectations<'a> {
    pub issuer: &'a str,
    pub audience: Option<&'a str>,
    pub leeway: u64,
}

/// Verify signature, issuer, audience and lifetime of a compact JWS.
pub(crate) fn decode_verified(
    jwt: &str,
    public_key: &RsaPublicKey,
    expect: &Expectations<'_>,
) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = expect.leeway;
    validation.set_issuer(&[expect.issuer]);
    validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
    match expect.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let key = decoding_key(public_key)?;
    let claims = jsonwebtoken::decode::<TokenClaims>(jwt, &key, &validation)
        .map_err(|e| TokenError::VerificationFailed(e.to_string()))?
        .claims;

    let leeway = i64::try_from(expect.leeway).unwrap_or(i64::MAX);
    let now = Utc::now().timestamp();
    if now >= claims.exp.saturating_add(leeway) {
        return Err(TokenError::VerificationFailed("token expired".to_string()));
    }
    if claims.iat > now.saturating_add(leeway) {
        return Err(TokenError::VerificationFailed(
            "token issued in the future".to_string(),
        ));
    }
    Ok(claims)
}

/// Verify a tenant token against `public_key` and return its content.
///
/// Checks signature and lifetime only; use
/// [`TenantAuthenticator`](crate::TenantAuthenticator) to authenticate a caller.
pub fn verified_content(token: &str, public_key: &RsaPublicKey) -> Result<TokenContent, TokenError> {
    let jwt = strip_bearer(token)
        .ok_or_else(|| TokenError::TokenParseFailed("missing bearer prefix".to_string()))?;
    let claims = decode_verified(
        jwt,
        public_key,
        &Expectations {
            issuer: sigil_core::constants::TENANT_ISSUER,
            audience: None,
            leeway: 0,
        },
    )?;
    let content = claims
        .content
        .ok_or_else(|| TokenError::VerificationFailed("token carries no content".to_string()))?;
    TokenContent::from_claim(&content)
}

/// Decoded but unverified token contents (for debugging).
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub algorithm: Algorithm,
    pub key_version: Option<String>,
    pub claims: TokenClaims,
}

/// Decode a token without checking its signature.
///
/// Never base an authorization decision on the result.
pub fn inspect_token_unverified(token: &str) -> Result<TokenInfo, TokenError> {
    let jwt = strip_bearer(token).unwrap_or(token.trim());

    let header =
        jsonwebtoken::decode_header(jwt).map_err(|e| TokenError::TokenParseFailed(e.to_string()))?;

    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| TokenError::TokenParseFailed("missing claims segment".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenError::TokenParseFailed(e.to_string()))?;
    let claims: TokenClaims =
        serde_json::from_slice(&bytes).map_err(|e| TokenError::SerializationError(e.to_string()))?;

    Ok(TokenInfo {
        algorithm: header.alg,
        key_version: header.kid,
        claims,
    })
}
