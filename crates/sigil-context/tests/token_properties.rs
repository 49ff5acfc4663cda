//! End-to-end behaviour of token issuance, verification and context checks.

use sigil_context::{SecurityContext, SecurityEnvironment, is_valid_guest_security_context};
use sigil_core::constants::{GUEST_USER, NO_AUTHENTICATION, SYSTEM_ADMIN_ROLE, SYSTEM_SU};
use sigil_core::{ApplicationName, SigilConfig};
use sigil_token::{
    AllowedOperation, AuthenticationError, InMemoryKeyStore, KeyStore, StaticPermittableEndpoints,
    SystemTokenSerializer, SystemTokenSpecification, TenantAuthenticator, TenantTokenSerializer,
    TenantTokenSpecification, TokenType,
};
use std::sync::{Arc, LazyLock};
use std::thread;

static ENV: LazyLock<SecurityEnvironment> =
    LazyLock::new(|| SecurityEnvironment::generate(&SigilConfig::default()).unwrap());

fn app(name: &str, version: &str) -> ApplicationName {
    ApplicationName::new(name, version)
}

#[test]
fn test_fresh_system_tokens_verify_for_every_tenant() {
    let office = app("office", "v1");
    for tenant in ["acme", "globex", "initech"] {
        let token = ENV.system_token(tenant, &office).unwrap();
        let identity = ENV
            .system_authenticator(&office)
            .authenticate(SYSTEM_SU, token.as_str(), Some("1"))
            .unwrap();
        assert_eq!(identity.tenant(), tenant);
        assert_eq!(identity.role(), Some(SYSTEM_ADMIN_ROLE));
    }
}

#[test]
fn test_fresh_tenant_tokens_verify_against_tenant_key() {
    let endpoints = Arc::new(StaticPermittableEndpoints::new().permit(
        TokenType::Tenant,
        "office-v1",
        "/accounts",
        AllowedOperation::Read,
    ));
    let authenticator =
        TenantAuthenticator::new(ENV.key_store().clone(), app("office", "v1"), endpoints);

    for ttl in [5, 60, 3600] {
        let token = TenantTokenSerializer::new()
            .build(
                TenantTokenSpecification::new()
                    .key_pair(&ENV.key_store().get_or_create_key_pair("acme").unwrap())
                    .user("alice")
                    .everything(&["office-v1"])
                    .seconds_to_live(ttl),
            )
            .unwrap();
        let identity = authenticator.authenticate("acme", "alice", token.as_str()).unwrap();
        assert!(identity.permits("office-v1", "/accounts", AllowedOperation::Read));
        assert!(authenticator.authenticate("globex", "alice", token.as_str()).is_err());
    }
}

#[test]
fn test_expired_token_fails_despite_valid_signature() {
    let office = app("office", "v1");
    let token = SystemTokenSerializer::new()
        .build(
            SystemTokenSpecification::new()
                .tenant("acme")
                .role(SYSTEM_ADMIN_ROLE)
                .seconds_to_live(10)
                .private_key(ENV.system_key().private_key().clone())
                .key_version("1")
                .target_application(office.clone())
                .issued_at(chrono::Utc::now() - chrono::Duration::seconds(11)),
        )
        .unwrap();

    assert!(!ENV.is_valid_token(&office, SYSTEM_SU, token.as_str()));
}

#[test]
fn test_token_bound_to_target_application() {
    let token = ENV.system_token("acme", &app("office", "v1")).unwrap();

    assert!(ENV.is_valid_token(&app("office", "v1"), SYSTEM_SU, token.as_str()));
    assert!(!ENV.is_valid_token(&app("office", "v2"), SYSTEM_SU, token.as_str()));
    assert!(!ENV.is_valid_token(&app("horus", "v1"), SYSTEM_SU, token.as_str()));
}

#[test]
fn test_issue_time_changes_token() {
    let spec = || {
        SystemTokenSpecification::new()
            .tenant("acme")
            .role(SYSTEM_ADMIN_ROLE)
            .seconds_to_live(60)
            .private_key(ENV.system_key().private_key().clone())
            .key_version("1")
            .target_application(app("office", "v1"))
    };
    let now = chrono::Utc::now();
    let serializer = SystemTokenSerializer::new();

    let first = serializer.build(spec().issued_at(now)).unwrap();
    let second = serializer
        .build(spec().issued_at(now + chrono::Duration::seconds(1)))
        .unwrap();
    assert_ne!(first.as_str(), second.as_str());
}

#[test]
fn test_guest_context_needs_all_three_conditions() {
    SecurityContext::guest("acme").scope(|| {
        assert!(is_valid_guest_security_context("acme").unwrap());
        assert!(ENV.is_valid_guest_security_context("acme").unwrap());
    });

    let flipped = [
        SecurityContext::user("globex", GUEST_USER, NO_AUTHENTICATION),
        SecurityContext::user("acme", "alice", NO_AUTHENTICATION),
        SecurityContext::user("acme", GUEST_USER, "Bearer x.y.z"),
    ];
    for context in flipped {
        context.scope(|| assert!(!is_valid_guest_security_context("acme").unwrap()));
    }
}

#[test]
fn test_one_permission_token_is_least_privilege() {
    SecurityContext::tenant("acme").scope(|| {
        let token = ENV
            .permission_token("alice", "appX-v1", "/accounts", AllowedOperation::Change)
            .unwrap();
        let content = ENV
            .token_content(token.as_str(), &ENV.tenant_public_key().unwrap())
            .unwrap();

        assert!(content.authorizes("appX-v1", "/accounts", AllowedOperation::Change));
        assert!(!content.authorizes("appX-v1", "/accounts", AllowedOperation::Read));
        assert!(!content.authorizes("appX-v1", "/accounts", AllowedOperation::Delete));
        assert!(!content.authorizes("appX-v1", "/customers", AllowedOperation::Change));
        assert!(!content.authorizes("appY-v1", "/accounts", AllowedOperation::Change));
    });
}

#[test]
fn test_everything_token_covers_named_applications_only() {
    SecurityContext::tenant("acme").scope(|| {
        let token = ENV.everything_token("alice", &["appX-v1", "appY-v1"]).unwrap();
        let content = ENV
            .token_content(token.as_str(), &ENV.tenant_public_key().unwrap())
            .unwrap();

        for operation in AllowedOperation::all() {
            assert!(content.authorizes("appX-v1", "/accounts/7", operation));
            assert!(content.authorizes("appY-v1", "/ledger", operation));
            assert!(!content.authorizes("appZ-v1", "/accounts", operation));
        }
    });
}

#[test]
fn test_missing_bearer_prefix_rejected() {
    let office = app("office", "v1");
    let token = ENV.system_token("acme", &office).unwrap();

    assert!(!ENV.is_valid_token(&office, SYSTEM_SU, token.jwt()));
    assert_eq!(
        ENV.system_authenticator(&office)
            .authenticate(SYSTEM_SU, token.jwt(), None)
            .unwrap_err(),
        AuthenticationError::NotAuthenticated
    );
}

#[test]
fn test_key_store_converges_under_concurrency() {
    let store = Arc::new(InMemoryKeyStore::default());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || store.get_or_create_key_pair("never-seen").unwrap())
        })
        .collect();
    let pairs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for pair in &pairs {
        assert!(Arc::ptr_eq(pair, &pairs[0]));
    }
    assert!(Arc::ptr_eq(
        &store.get_or_create_key_pair("never-seen").unwrap(),
        &pairs[0]
    ));
}

#[test]
fn test_system_context_round_trip() {
    let office = app("office", "v1");
    {
        let _guard = ENV.system_context("acme", &office).unwrap();
        assert!(ENV.is_valid_system_security_context(&office, "acme").unwrap());
    }
    assert!(ENV.is_valid_system_security_context(&office, "acme").is_err());
}

#[test]
fn test_system_token_not_valid_for_other_tenant() {
    let office = app("office", "v1");
    let token = ENV.system_token("globex", &office).unwrap();

    SecurityContext::system("acme", &token).scope(|| {
        assert!(!ENV.is_valid_system_security_context(&office, "acme").unwrap());
    });
}

#[test]
fn test_one_resource_grant_stays_on_that_resource() {
    let endpoints = Arc::new(StaticPermittableEndpoints::new().permit(
        TokenType::Tenant,
        "office-v1",
        "/accounts/{id}",
        AllowedOperation::Delete,
    ));
    let authenticator =
        TenantAuthenticator::new(ENV.key_store().clone(), app("office", "v1"), endpoints);

    SecurityContext::tenant("acme").scope(|| {
        let token = ENV
            .permission_token("alice", "office-v1", "/accounts/42", AllowedOperation::Delete)
            .unwrap();
        let identity = authenticator.authenticate("acme", "alice", token.as_str()).unwrap();

        assert!(!identity.permits("office-v1", "/accounts/99", AllowedOperation::Delete));
        assert!(!identity.permits("office-v1", "/accounts/{x}", AllowedOperation::Delete));
    });
}

#[test]
fn test_environment_from_configured_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let private_key = dir.path().join("system.pem");
    std::fs::write(&private_key, ENV.system_key().private_key_pem().unwrap()).unwrap();

    let yaml = format!(
        "keys:\n  system_key_version: \"7\"\n  system_private_key_file: {}\n",
        private_key.display()
    );
    let config = SigilConfig::from_yaml(&yaml).unwrap();
    let env = SecurityEnvironment::from_config(&config).unwrap();

    assert_eq!(env.system_key().public_key(), ENV.system_key().public_key());
    assert_eq!(env.system_key().version(), "7");

    let office = app("office", "v1");
    let token = env.system_token("acme", &office).unwrap();
    assert!(env.is_valid_token(&office, SYSTEM_SU, token.as_str()));
    // Same key, different version.
    assert!(!ENV.is_valid_token(&office, SYSTEM_SU, token.as_str()));
}

#[tokio::test]
async fn test_async_scope_carries_identity_across_awaits() {
    let office = app("office", "v1");
    let token = ENV.system_token("acme", &office).unwrap();

    let valid = SecurityContext::system("acme", &token)
        .scope_async(async {
            tokio::task::yield_now().await;
            ENV.is_valid_system_security_context(&app("office", "v1"), "acme")
        })
        .await
        .unwrap();
    assert!(valid);
}
