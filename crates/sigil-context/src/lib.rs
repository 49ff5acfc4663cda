//! # sigil-context
//!
//! Request-scoped identity for Sigil services.
//!
//! - [`context`]: the [`SecurityContext`] binding and its ambient readers
//! - [`environment`]: [`SecurityEnvironment`], which mints tokens for the
//!   active tenant and validates guest and system contexts

pub mod context;
pub mod environment;

pub use context::{
    ContextError, ContextGuard, ScopedFuture, SecurityContext, current, current_tenant,
    current_token, current_user, is_valid_guest_security_context, tenant_identifier,
};
pub use environment::{EnvironmentError, SecurityEnvironment};
