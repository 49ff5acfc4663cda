//! Token issuance and validation wired to the ambient context.
//!
//! [`SecurityEnvironment`] owns the root (system) key and a per-tenant
//! [`InMemoryKeyStore`], mints system and tenant tokens with configured
//! lifetimes, and checks the active [`SecurityContext`].

use crate::context::{self, ContextError, ContextGuard, SecurityContext};
use sigil_core::constants::{SYSTEM_ADMIN_ROLE, SYSTEM_SU};
use sigil_core::{ApplicationName, ConfigError, SigilConfig};
use sigil_token::{
    AllowedOperation, InMemoryKeyStore, KeyPairHolder, KeyStore, PermittableEndpoints, RsaPrivateKey,
    RsaPublicKey, StaticPermittableEndpoints, StaticSystemKeyProvider, SystemAuthenticator,
    SystemTokenSerializer, SystemTokenSpecification, TenantTokenSerializer, TenantTokenSpecification,
    Token, TokenContent, TokenError, verified_content,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Issues and checks tokens for one deployment.
pub struct SecurityEnvironment {
    system_key: Arc<KeyPairHolder>,
    key_store: Arc<InMemoryKeyStore>,
    endpoints: Arc<dyn PermittableEndpoints>,
    system_serializer: SystemTokenSerializer,
    tenant_serializer: TenantTokenSerializer,
    system_token_ttl: i64,
    user_token_ttl: i64,
    permission_token_ttl: i64,
    leeway: u64,
}

impl SecurityEnvironment {
    /// Build around an existing root key.
    pub fn new(system_key: KeyPairHolder, config: &SigilConfig) -> Result<Self, EnvironmentError> {
        config.validate()?;
        let tokens = &config.tokens;

        let mut system_serializer = SystemTokenSerializer::new();
        let mut tenant_serializer = TenantTokenSerializer::new();
        if let Some(max) = tokens.max_token_lifetime()? {
            system_serializer = system_serializer.with_max_lifetime(max);
            tenant_serializer = tenant_serializer.with_max_lifetime(max);
        }

        Ok(Self {
            system_key: Arc::new(system_key),
            key_store: Arc::new(InMemoryKeyStore::new(config.keys.rsa_key_bits)),
            endpoints: Arc::new(StaticPermittableEndpoints::new()),
            system_serializer,
            tenant_serializer,
            system_token_ttl: seconds(tokens.system_token_ttl()?),
            user_token_ttl: seconds(tokens.user_token_ttl()?),
            permission_token_ttl: seconds(tokens.permission_token_ttl()?),
            leeway: tokens.leeway_seconds,
        })
    }

    /// Build around a freshly generated root key.
    pub fn generate(config: &SigilConfig) -> Result<Self, EnvironmentError> {
        let system_key = KeyPairHolder::generate(
            SYSTEM_SU,
            config.keys.system_key_version.clone(),
            config.keys.rsa_key_bits,
        )?;
        Self::new(system_key, config)
    }

    /// Use the configured root private key, or generate one if none is configured.
    pub fn from_config(config: &SigilConfig) -> Result<Self, EnvironmentError> {
        let pem = config.keys.resolve_private_key().map_err(ConfigError::Io)?;
        match pem {
            Some(pem) => {
                let system_key = KeyPairHolder::from_private_key_pem(
                    SYSTEM_SU,
                    config.keys.system_key_version.clone(),
                    pem.trim(),
                )?;
                tracing::info!(version = system_key.version(), "loaded system signing key");
                Self::new(system_key, config)
            }
            None => {
                tracing::info!("no system key configured, generating one");
                Self::generate(config)
            }
        }
    }

    /// Endpoints consulted when authenticating system tokens.
    pub fn with_permittable_endpoints(mut self, endpoints: Arc<dyn PermittableEndpoints>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn system_key(&self) -> &KeyPairHolder {
        &self.system_key
    }

    pub fn key_store(&self) -> &Arc<InMemoryKeyStore> {
        &self.key_store
    }

    /// System token for `tenant`, valid only at `application`.
    pub fn system_token(
        &self,
        tenant: &str,
        application: &ApplicationName,
    ) -> Result<Token, EnvironmentError> {
        let spec = SystemTokenSpecification::new()
            .tenant(tenant)
            .role(SYSTEM_ADMIN_ROLE)
            .seconds_to_live(self.system_token_ttl)
            .private_key(self.system_key.private_key().clone())
            .key_version(self.system_key.version())
            .target_application(application.clone());
        Ok(self.system_serializer.build(spec)?)
    }

    pub fn system_token_for_current_tenant(
        &self,
        application: &ApplicationName,
    ) -> Result<Token, EnvironmentError> {
        let tenant = context::current_tenant()?;
        self.system_token(&tenant, application)
    }

    /// Bind the super-user of `tenant` with a fresh system token.
    pub fn system_context(
        &self,
        tenant: &str,
        application: &ApplicationName,
    ) -> Result<ContextGuard, EnvironmentError> {
        let token = self.system_token(tenant, application)?;
        tracing::debug!(tenant, %application, "entering system context");
        Ok(SecurityContext::system(tenant, &token).enter())
    }

    /// Bind `user` of `tenant` with an everything token for `applications`.
    pub fn user_context<S: AsRef<str>>(
        &self,
        tenant: &str,
        user: &str,
        applications: &[S],
    ) -> Result<ContextGuard, EnvironmentError> {
        let key_pair = self.key_store.get_or_create_key_pair(tenant)?;
        let token = self.tenant_token(
            &key_pair,
            user,
            TokenContent::everything(applications),
            self.user_token_ttl,
        )?;
        tracing::debug!(tenant, user, "entering user context");
        Ok(SecurityContext::user(tenant, user, token.into_string()).enter())
    }

    /// Every operation on each application, signed with the current tenant's key.
    pub fn everything_token<S: AsRef<str>>(
        &self,
        user: &str,
        applications: &[S],
    ) -> Result<Token, EnvironmentError> {
        let key_pair = self.tenant_key_pair()?;
        self.tenant_token(
            &key_pair,
            user,
            TokenContent::everything(applications),
            self.user_token_ttl,
        )
    }

    /// One operation on one URI, signed with the current tenant's key.
    pub fn permission_token(
        &self,
        user: &str,
        application: &str,
        uri: &str,
        operation: AllowedOperation,
    ) -> Result<Token, EnvironmentError> {
        let key_pair = self.tenant_key_pair()?;
        self.tenant_token(
            &key_pair,
            user,
            TokenContent::one_permission(application, uri, operation),
            self.permission_token_ttl,
        )
    }

    /// Key pair of the current tenant, created on first use.
    pub fn tenant_key_pair(&self) -> Result<Arc<KeyPairHolder>, EnvironmentError> {
        let tenant = context::current_tenant()?;
        Ok(self.key_store.get_or_create_key_pair(&tenant)?)
    }

    pub fn tenant_public_key(&self) -> Result<RsaPublicKey, EnvironmentError> {
        Ok(self.tenant_key_pair()?.public_key().clone())
    }

    pub fn tenant_private_key(&self) -> Result<RsaPrivateKey, EnvironmentError> {
        Ok(self.tenant_key_pair()?.private_key().clone())
    }

    /// Authenticator for system tokens aimed at `application`.
    pub fn system_authenticator(&self, application: &ApplicationName) -> SystemAuthenticator {
        let keys = StaticSystemKeyProvider::new()
            .with_key(self.system_key.version(), self.system_key.public_key().clone());
        SystemAuthenticator::new(Arc::new(keys), application.clone(), self.endpoints.clone())
            .with_leeway(self.leeway)
    }

    pub fn is_valid_guest_security_context(&self, tenant: &str) -> Result<bool, EnvironmentError> {
        Ok(context::is_valid_guest_security_context(tenant)?)
    }

    /// True iff the active context is the super-user of `tenant` holding a
    /// valid system token issued for `tenant` and `application`.
    pub fn is_valid_system_security_context(
        &self,
        application: &ApplicationName,
        tenant: &str,
    ) -> Result<bool, EnvironmentError> {
        let current = context::current()?;
        let valid = current.tenant_identifier() == tenant
            && current.user_identifier() == Some(SYSTEM_SU)
            && current.token().is_some_and(|token| {
                self.system_authenticator(application)
                    .authenticate_for_tenant(tenant, SYSTEM_SU, token, Some(self.system_key.version()))
                    .is_ok()
            });
        Ok(valid)
    }

    /// Whether `token` is a system token for `user` at `application`.
    ///
    /// Inside an active context the token must also belong to its tenant.
    pub fn is_valid_token(&self, application: &ApplicationName, user: &str, token: &str) -> bool {
        let authenticator = self.system_authenticator(application);
        let version = Some(self.system_key.version());
        let result = match context::tenant_identifier() {
            Some(tenant) => authenticator.authenticate_for_tenant(&tenant, user, token, version),
            None => authenticator.authenticate(user, token, version),
        };
        result.is_ok()
    }

    /// Verify a tenant token with `public_key` and return its grants.
    pub fn token_content(
        &self,
        token: &str,
        public_key: &RsaPublicKey,
    ) -> Result<TokenContent, EnvironmentError> {
        Ok(verified_content(token, public_key)?)
    }

    fn tenant_token(
        &self,
        key_pair: &KeyPairHolder,
        user: &str,
        content: TokenContent,
        seconds_to_live: i64,
    ) -> Result<Token, EnvironmentError> {
        let spec = TenantTokenSpecification::new()
            .key_pair(key_pair)
            .user(user)
            .token_content(content)
            .seconds_to_live(seconds_to_live);
        Ok(self.tenant_serializer.build(spec)?)
    }
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
