//! # sigil-token
//!
//! RSA-signed identity tokens for services in a multi-tenant mesh.
//!
//! Two kinds of tokens exist:
//!
//! - **System tokens** assert the administrative role for exactly one target
//!   application. They are signed with the root key and verified by
//!   [`SystemAuthenticator`].
//! - **Tenant tokens** carry a user and an explicit [`TokenContent`] list of
//!   permission grants. They are signed with the tenant's key from a
//!   [`KeyStore`] and verified by [`TenantAuthenticator`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use sigil_token::{InMemoryKeyStore, KeyStore, TenantTokenSerializer, TenantTokenSpecification};
//!
//! let store = InMemoryKeyStore::default();
//! let pair = store.get_or_create_key_pair("acme")?;
//!
//! let token = TenantTokenSerializer::new().build(
//!     TenantTokenSpecification::new()
//!         .key_pair(&pair)
//!         .user("alice")
//!         .everything(&["office-v1"])
//!         .seconds_to_live(600),
//! )?;
//! ```

pub mod authenticator;
pub mod claims;
pub mod content;
pub mod error;
pub mod keys;
pub mod provider;
pub mod registry;
pub mod store;
pub mod system;
pub mod tenant;
pub mod token;

pub use authenticator::{SystemAuthenticator, TenantAuthenticator, ValidatedIdentity};
pub use claims::TokenClaims;
pub use content::{AllowedOperation, TokenContent, TokenPermission};
pub use error::{AuthenticationError, TokenError};
pub use keys::KeyPairHolder;
pub use provider::{StaticSystemKeyProvider, SystemKeyProvider};
pub use registry::{
    ApplicationPermission, PermittableEndpoints, StaticPermittableEndpoints, TokenType,
};
pub use store::{InMemoryKeyStore, KeyStore, PublicKeyLookup, StaticPublicKeys};
pub use system::{SystemTokenSerializer, SystemTokenSpecification};
pub use tenant::{TenantTokenSerializer, TenantTokenSpecification};
pub use token::{Token, TokenInfo, inspect_token_unverified, strip_bearer, verified_content};

pub use rsa::{RsaPrivateKey, RsaPublicKey};
