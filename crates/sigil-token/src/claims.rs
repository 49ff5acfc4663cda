//! JWT claims shared by system and tenant tokens.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The signed claim set.
///
/// System tokens carry `aud` (target application) and `role`; tenant tokens
/// carry `content`, the serialized [`TokenContent`](crate::TokenContent).
/// The envelope never interprets `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User, or the super-user for system tokens.
    pub sub: String,

    /// Token type marker (`system` or `tenant`).
    pub iss: String,

    /// Tenant the token was issued for.
    pub tid: String,

    /// Target application (`name-version`), system tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Issued-at, seconds since the epoch.
    pub iat: i64,

    /// Expiry, seconds since the epoch.
    pub exp: i64,

    /// Unique token identifier.
    pub jti: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl TokenClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp(self.exp)
    }

    /// Whether the token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}
