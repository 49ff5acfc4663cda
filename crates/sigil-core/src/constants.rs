//! Well-known identifiers.

/// Prefix every token carries on the wire.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Token bound to guest contexts, which never carry a signed credential.
pub const NO_AUTHENTICATION: &str = "N/A";

/// User identifier bound to guest contexts.
pub const GUEST_USER: &str = "guest";

/// Subject of every system token.
pub const SYSTEM_SU: &str = "system";

/// Administrative role asserted by system tokens.
pub const SYSTEM_ADMIN_ROLE: &str = "system_admin";

/// Version of the serialized permission payload embedded in tenant tokens.
pub const CONTENT_FORMAT_VERSION: u32 = 1;

/// `iss` claim of tokens signed by the root authority.
pub const SYSTEM_ISSUER: &str = "system";

/// `iss` claim of tokens signed by a tenant key.
pub const TENANT_ISSUER: &str = "tenant";

/// Minimum RSA modulus size accepted for signing keys.
pub const MIN_RSA_KEY_BITS: usize = 2048;
