//! Ambient security context.
//!
//! A [`SecurityContext`] binds `(tenant, user, token)` for the code running
//! inside it. Bindings form a per-thread stack: entering pushes, leaving pops,
//! so nested scopes always restore exactly what was bound before them.
//!
//! [`SecurityContext::scope_async`] re-enters its binding on every poll and
//! carries bindings entered inside the future across `.await` points.
//!
//! Prefer passing a `SecurityContext` explicitly. The ambient readers
//! ([`current_tenant`], [`current_user`], [`current_token`]) exist for code
//! that cannot take the context as a parameter, and fail outside a scope.

use sigil_core::constants::{GUEST_USER, NO_AUTHENTICATION, SYSTEM_SU};
use sigil_token::Token;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use thiserror::Error;

thread_local! {
    static STACK: RefCell<Vec<Binding>> = const { RefCell::new(Vec::new()) };
}

static NEXT_BINDING: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
struct Binding {
    id: u64,
    context: SecurityContext,
}

impl Binding {
    fn new(context: SecurityContext) -> Self {
        Self {
            id: NEXT_BINDING.fetch_add(1, Ordering::Relaxed),
            context,
        }
    }
}

/// Reading the ambient context failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("no security context is active")]
    NoActiveScope,

    #[error("the active security context has no user")]
    NoUserBound,

    #[error("the active security context has no token")]
    NoTokenBound,
}

/// The identity a unit of work runs as.
#[derive(Clone, PartialEq, Eq)]
pub struct SecurityContext {
    tenant: String,
    user: Option<String>,
    token: Option<String>,
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("tenant", &self.tenant)
            .field("user", &self.user)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl SecurityContext {
    /// Tenant only, no user.
    pub fn tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            user: None,
            token: None,
        }
    }

    /// The super-user presenting a system token.
    pub fn system(tenant: impl Into<String>, token: &Token) -> Self {
        Self::user(tenant, SYSTEM_SU, token.as_str())
    }

    pub fn user(tenant: impl Into<String>, user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            user: Some(user.into()),
            token: Some(token.into()),
        }
    }

    /// Unauthenticated guest.
    pub fn guest(tenant: impl Into<String>) -> Self {
        Self::user(tenant, GUEST_USER, NO_AUTHENTICATION)
    }

    pub fn tenant_identifier(&self) -> &str {
        &self.tenant
    }

    pub fn user_identifier(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Bind this context to the current thread until the guard is dropped.
    pub fn enter(self) -> ContextGuard {
        let binding = Binding::new(self);
        let id = binding.id;
        STACK.with(|stack| stack.borrow_mut().push(binding));
        ContextGuard {
            id,
            _not_send: PhantomData,
        }
    }

    /// Run `f` with this context bound.
    pub fn scope<R>(self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// Bind this context around every poll of `future`.
    pub fn scope_async<F: Future>(self, future: F) -> ScopedFuture<F> {
        ScopedFuture {
            binding: Binding::new(self),
            suspended: Vec::new(),
            future: Box::pin(future),
        }
    }
}

/// Restores the previous binding when dropped.
#[must_use = "the context is unbound as soon as the guard is dropped"]
pub struct ContextGuard {
    id: u64,
    // Bindings live on the entering thread.
    _not_send: PhantomData<*const ()>,
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard").field("id", &self.id).finish()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        // The thread-local may already be gone during thread teardown.
        let _ = STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            // Absent when an outer guard already unwound this binding.
            if let Some(position) = stack.iter().rposition(|binding| binding.id == self.id) {
                stack.truncate(position);
            }
        });
    }
}

/// Future returned by [`SecurityContext::scope_async`].
pub struct ScopedFuture<F> {
    binding: Binding,
    // Bindings entered by the inner future and still held at its last `Pending`.
    suspended: Vec<Binding>,
    future: Pin<Box<F>>,
}

impl<F: Future> Future for ScopedFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let frame = STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let base = stack.len();
            stack.push(this.binding.clone());
            stack.append(&mut this.suspended);
            PollFrame { base }
        });

        let poll = this.future.as_mut().poll(cx);
        if poll.is_pending() {
            this.suspended = STACK.with(|stack| {
                let mut stack = stack.borrow_mut();
                if stack.len() > frame.base + 1 {
                    stack.split_off(frame.base + 1)
                } else {
                    Vec::new()
                }
            });
        }
        poll
    }
}

/// Unwinds one poll of a [`ScopedFuture`], also when the inner future panics.
struct PollFrame {
    base: usize,
}

impl Drop for PollFrame {
    fn drop(&mut self) {
        let _ = STACK.try_with(|stack| stack.borrow_mut().truncate(self.base));
    }
}

fn with_current<R>(f: impl FnOnce(&SecurityContext) -> R) -> Result<R, ContextError> {
    STACK.with(|stack| {
        stack
            .borrow()
            .last()
            .map(|binding| f(&binding.context))
            .ok_or(ContextError::NoActiveScope)
    })
}

/// The innermost active context.
pub fn current() -> Result<SecurityContext, ContextError> {
    with_current(SecurityContext::clone)
}

pub fn current_tenant() -> Result<String, ContextError> {
    with_current(|context| context.tenant.clone())
}

pub fn current_user() -> Result<String, ContextError> {
    with_current(|context| context.user.clone())?.ok_or(ContextError::NoUserBound)
}

pub fn current_token() -> Result<String, ContextError> {
    with_current(|context| context.token.clone())?.ok_or(ContextError::NoTokenBound)
}

/// Tenant of the innermost active context, if any.
pub fn tenant_identifier() -> Option<String> {
    current_tenant().ok()
}

/// True iff the active context is the guest of `tenant` without credentials.
pub fn is_valid_guest_security_context(tenant: &str) -> Result<bool, ContextError> {
    with_current(|context| {
        context.tenant == tenant
            && context.user.as_deref() == Some(GUEST_USER)
            && context.token.as_deref() == Some(NO_AUTHENTICATION)
    })
}
