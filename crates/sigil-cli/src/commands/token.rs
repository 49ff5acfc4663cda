//! Token management commands.
//!
//! `sigil token system` - Mint a system token for one target application.
//! `sigil token tenant` - Mint a tenant token carrying permission grants.
//! `sigil token verify` - Verify a token.
//! `sigil token inspect` - Inspect a token's contents.

use anyhow::{Context, bail};
use sigil_core::constants::{SYSTEM_ADMIN_ROLE, SYSTEM_SU, TENANT_ISSUER};
use sigil_core::{ApplicationName, SigilConfig};
use sigil_token::keys::{load_private_key_pem, load_public_key_file, load_public_key_pem};
use sigil_token::{
    AllowedOperation, RsaPrivateKey, RsaPublicKey, StaticPermittableEndpoints, StaticPublicKeys,
    StaticSystemKeyProvider, SystemAuthenticator, SystemTokenSerializer, SystemTokenSpecification,
    TenantAuthenticator, TenantTokenSerializer, TenantTokenSpecification, Token, TokenContent,
    TokenPermission, ValidatedIdentity, inspect_token_unverified,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Options for `sigil token system`.
#[derive(Debug, Clone)]
pub struct SystemTokenOptions {
    pub key: Option<String>,
    pub key_version: Option<String>,
    pub tenant: String,
    pub application: ApplicationName,
    pub ttl: Option<String>,
    pub output: Option<PathBuf>,
}

/// Options for `sigil token tenant`.
#[derive(Debug, Clone)]
pub struct TenantTokenOptions {
    pub key: Option<String>,
    pub key_version: String,
    pub tenant: String,
    pub user: String,
    pub everything: Vec<String>,
    pub grants: Vec<String>,
    pub ttl: Option<String>,
    pub output: Option<PathBuf>,
}

/// Options for `sigil token verify`.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub key: Option<String>,
    pub key_version: Option<String>,
    pub application: ApplicationName,
    pub tenant: Option<String>,
    pub user: Option<String>,
    pub token: String,
}

/// Resolve a private key from a file path, a PEM string, or the configuration.
fn resolve_private_key(key: Option<String>, config: &SigilConfig) -> anyhow::Result<RsaPrivateKey> {
    let pem = match key {
        Some(key) => {
            let path = Path::new(&key);
            if path.exists() {
                fs::read_to_string(path).with_context(|| {
                    format!("Failed to read private key from file: {}", path.display())
                })?
            } else {
                key
            }
        }
        None => config.keys.resolve_private_key()?.context(
            "Private key not provided. Pass --key <path>, set SIGIL_PRIVATE_KEY, or configure keys.system_private_key_file",
        )?,
    };

    load_private_key_pem(pem.trim()).context("Failed to parse private key. Expected an RSA key in PEM format")
}

/// Resolve a public key from a file path, a PEM string, or the configuration.
fn resolve_public_key(key: Option<String>, config: &SigilConfig) -> anyhow::Result<RsaPublicKey> {
    match key {
        Some(key) => {
            let path = Path::new(&key);
            if path.exists() {
                return load_public_key_file(path).with_context(|| {
                    format!("Failed to load public key from file: {}", path.display())
                });
            }
            load_public_key_pem(key.trim())
                .context("Failed to parse public key. Expected an RSA key in PEM format")
        }
        None => {
            let pem = config.keys.resolve_public_key()?.context(
                "Public key not provided. Pass --key <path>, set SIGIL_PUBLIC_KEY, or configure keys.system_public_key_file",
            )?;
            Ok(load_public_key_pem(pem.trim())?)
        }
    }
}

/// Token passed literally or as a path to a file containing it.
fn read_token(token: String) -> anyhow::Result<String> {
    if Path::new(&token).exists() {
        Ok(fs::read_to_string(&token)?.trim().to_string())
    } else {
        Ok(token)
    }
}

fn seconds_to_live(ttl: &str) -> anyhow::Result<i64> {
    let duration =
        humantime::parse_duration(ttl.trim()).with_context(|| format!("Invalid duration: {ttl}"))?;
    Ok(i64::try_from(duration.as_secs())?)
}

/// Parse `path=OP[,OP...]`, e.g. `office-v1/accounts/{id}=READ,CHANGE`.
fn parse_grant(grant: &str) -> anyhow::Result<TokenPermission> {
    let (path, operations) = grant
        .split_once('=')
        .with_context(|| format!("Invalid grant '{grant}'. Expected <path>=<OP>[,<OP>...]"))?;
    let operations = operations
        .split(',')
        .map(str::parse::<AllowedOperation>)
        .collect::<Result<Vec<_>, _>>()?;
    if path.trim().is_empty() || operations.is_empty() {
        bail!("Invalid grant '{grant}'");
    }
    Ok(TokenPermission::new(path.trim(), operations))
}

fn format_seconds(seconds: i64) -> String {
    humantime::format_duration(Duration::from_secs(seconds.unsigned_abs())).to_string()
}

fn emit(token: &Token, output: Option<&Path>, summary: &[(&str, String)]) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, token.as_str())?;
            println!("✔ Token written to: {}", path.display());
            for (label, value) in summary {
                println!("  {label}: {value}");
            }
        }
        None => println!("{token}"),
    }
    Ok(())
}

/// Mint a system token.
pub fn system(options: SystemTokenOptions, config: &SigilConfig) -> anyhow::Result<Token> {
    let private_key = resolve_private_key(options.key, config)?;
    let key_version = options
        .key_version
        .unwrap_or_else(|| config.keys.system_key_version.clone());
    let ttl = match &options.ttl {
        Some(ttl) => seconds_to_live(ttl)?,
        None => i64::try_from(config.tokens.system_token_ttl()?.as_secs())?,
    };

    let token = SystemTokenSerializer::new().build(
        SystemTokenSpecification::new()
            .tenant(&options.tenant)
            .role(SYSTEM_ADMIN_ROLE)
            .seconds_to_live(ttl)
            .private_key(private_key)
            .key_version(&key_version)
            .target_application(options.application.clone()),
    )?;

    emit(
        &token,
        options.output.as_deref(),
        &[
            ("Type", "System token".to_string()),
            ("Tenant", options.tenant),
            ("Application", options.application.to_string()),
            ("Key version", key_version),
            ("Expires in", format_seconds(ttl)),
        ],
    )?;
    Ok(token)
}

/// Mint a tenant token.
pub fn tenant(options: TenantTokenOptions, config: &SigilConfig) -> anyhow::Result<Token> {
    let private_key = resolve_private_key(options.key, config)?;
    let ttl = match &options.ttl {
        Some(ttl) => seconds_to_live(ttl)?,
        None => i64::try_from(config.tokens.user_token_ttl()?.as_secs())?,
    };

    let mut permissions: Vec<TokenPermission> = options
        .everything
        .iter()
        .map(|application| TokenPermission::everything(application))
        .collect();
    for grant in &options.grants {
        permissions.push(parse_grant(grant)?);
    }
    if permissions.is_empty() {
        bail!("A tenant token needs at least one --everything <app> or --grant <path>=<OPS>");
    }
    let grants = permissions.len();

    let token = TenantTokenSerializer::new().build(
        TenantTokenSpecification::new()
            .tenant(&options.tenant)
            .user(&options.user)
            .token_content(TokenContent::new(permissions))
            .seconds_to_live(ttl)
            .private_key(private_key)
            .key_version(&options.key_version),
    )?;

    emit(
        &token,
        options.output.as_deref(),
        &[
            ("Type", "Tenant token".to_string()),
            ("Tenant", options.tenant),
            ("User", options.user),
            ("Grants", grants.to_string()),
            ("Expires in", format_seconds(ttl)),
        ],
    )?;
    Ok(token)
}

/// Verify a system token, or a tenant token when `--tenant` is given.
pub fn verify(options: VerifyOptions, config: &SigilConfig) -> anyhow::Result<ValidatedIdentity> {
    let public_key = resolve_public_key(options.key, config)?;
    let token = read_token(options.token)?;
    let key_version = match options.key_version {
        Some(version) => version,
        None => inspect_token_unverified(&token)
            .ok()
            .and_then(|info| info.key_version)
            .unwrap_or_else(|| config.keys.system_key_version.clone()),
    };
    let endpoints = Arc::new(StaticPermittableEndpoints::new());
    let leeway = config.tokens.leeway_seconds;

    let result = match &options.tenant {
        Some(tenant) => {
            let user = options
                .user
                .as_deref()
                .context("--user is required to verify a tenant token")?;
            let keys = StaticPublicKeys::new().with_key(tenant.as_str(), key_version.as_str(), public_key);
            TenantAuthenticator::new(Arc::new(keys), options.application.clone(), endpoints)
                .with_leeway(leeway)
                .authenticate(tenant, user, &token)
        }
        None => {
            let user = options.user.as_deref().unwrap_or(SYSTEM_SU);
            let keys = StaticSystemKeyProvider::new().with_key(key_version.as_str(), public_key);
            SystemAuthenticator::new(Arc::new(keys), options.application.clone(), endpoints)
                .with_leeway(leeway)
                .authenticate(user, &token, Some(key_version.as_str()))
        }
    };

    let identity = match result {
        Ok(identity) => identity,
        Err(e) if e.is_transient() => bail!("✖ Token could not be verified: {e}"),
        Err(_) => bail!("✖ Token verification failed"),
    };

    println!("✔ Token is valid");
    println!();
    println!("Token Details:");
    println!("  Type: {}", identity.token_type());
    println!("  User: {}", identity.user());
    println!("  Tenant: {}", identity.tenant());
    if let Some(role) = identity.role() {
        println!("  Role: {role}");
    }
    if let Some(content) = identity.content() {
        for permission in content.permissions() {
            println!("  Grant: {} {:?}", permission.path(), permission.allowed_operations());
        }
    }
    println!("  Expires: {}", identity.expires_at().to_rfc3339());

    Ok(identity)
}

/// Inspect a token without verification.
pub fn inspect(token: String) -> anyhow::Result<()> {
    let token = read_token(token)?;
    let info = inspect_token_unverified(&token)?;

    println!("Token Information (signature NOT verified):");
    println!("  Algorithm: {:?}", info.algorithm);
    println!(
        "  Key version: {}",
        info.key_version.as_deref().unwrap_or("(none)")
    );
    println!("  Issued: {}", info.claims.issued_at().to_rfc3339());
    println!("  Expires: {}", info.claims.expires_at().to_rfc3339());
    if info.claims.is_expired_at(chrono::Utc::now()) {
        println!("  ⚠️  Token is expired");
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&info.claims)?);

    if info.claims.iss == TENANT_ISSUER {
        if let Some(content) = &info.claims.content {
            let content = TokenContent::from_claim(content)?;
            println!();
            println!("Grants:");
            for permission in content.permissions() {
                println!("  {} {:?}", permission.path(), permission.allowed_operations());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_token::{KeyPairHolder, TokenType};
    use std::sync::LazyLock;
    use tempfile::tempdir;

    static KEY: LazyLock<KeyPairHolder> =
        LazyLock::new(|| KeyPairHolder::generate("system", "1", 2048).unwrap());

    fn write_keys(dir: &Path) -> (PathBuf, PathBuf) {
        let private_path = dir.join("private.pem");
        let public_path = dir.join("public.pem");
        KEY.save_to_files(&private_path, &public_path).unwrap();
        (private_path, public_path)
    }

    fn office() -> ApplicationName {
        ApplicationName::new("office", "v1")
    }

    #[test]
    fn test_parse_grant() {
        let grant = parse_grant("office-v1/accounts/{id}=read,CHANGE").unwrap();
        assert_eq!(grant.path(), "office-v1/accounts/{id}");
        assert_eq!(grant.allowed_operations().len(), 2);

        assert!(parse_grant("office-v1/accounts").is_err());
        assert!(parse_grant("office-v1/accounts=FLY").is_err());
        assert!(parse_grant("=READ").is_err());
    }

    #[test]
    fn test_seconds_to_live() {
        assert_eq!(seconds_to_live("12h").unwrap(), 12 * 3600);
        assert_eq!(seconds_to_live("100s").unwrap(), 100);
        assert!(seconds_to_live("soon").is_err());
    }

    #[test]
    fn test_mint_and_verify_system_token() {
        let dir = tempdir().unwrap();
        let (private_path, public_path) = write_keys(dir.path());
        let token_path = dir.path().join("system.token");
        let config = SigilConfig::default();

        system(
            SystemTokenOptions {
                key: Some(private_path.to_string_lossy().to_string()),
                key_version: None,
                tenant: "acme".to_string(),
                application: office(),
                ttl: Some("1h".to_string()),
                output: Some(token_path.clone()),
            },
            &config,
        )
        .unwrap();

        let identity = verify(
            VerifyOptions {
                key: Some(public_path.to_string_lossy().to_string()),
                key_version: None,
                application: office(),
                tenant: None,
                user: None,
                token: token_path.to_string_lossy().to_string(),
            },
            &config,
        )
        .unwrap();
        assert_eq!(identity.token_type(), TokenType::System);
        assert_eq!(identity.tenant(), "acme");

        let wrong_application = verify(
            VerifyOptions {
                key: Some(public_path.to_string_lossy().to_string()),
                key_version: None,
                application: ApplicationName::new("office", "v2"),
                tenant: None,
                user: None,
                token: token_path.to_string_lossy().to_string(),
            },
            &config,
        );
        assert!(wrong_application.is_err());
    }

    #[test]
    fn test_mint_and_verify_tenant_token_with_pem_strings() {
        let config = SigilConfig::default();
        let token = tenant(
            TenantTokenOptions {
                key: Some(KEY.private_key_pem().unwrap()),
                key_version: "3".to_string(),
                tenant: "acme".to_string(),
                user: "alice".to_string(),
                everything: vec![],
                grants: vec!["office-v1/accounts=READ".to_string()],
                ttl: None,
                output: None,
            },
            &config,
        )
        .unwrap();

        let options = VerifyOptions {
            key: Some(KEY.public_key_pem().unwrap()),
            key_version: None,
            application: office(),
            tenant: Some("acme".to_string()),
            user: Some("alice".to_string()),
            token: token.into_string(),
        };
        let identity = verify(options.clone(), &config).unwrap();
        let content = identity.content().unwrap();
        assert!(content.authorizes("office-v1", "/accounts", AllowedOperation::Read));
        assert!(!content.authorizes("office-v1", "/accounts", AllowedOperation::Change));

        let other_user = VerifyOptions {
            user: Some("bob".to_string()),
            ..options.clone()
        };
        assert!(verify(other_user, &config).is_err());

        let no_user = VerifyOptions { user: None, ..options };
        assert!(verify(no_user, &config).is_err());
    }

    #[test]
    fn test_tenant_token_needs_grants() {
        let result = tenant(
            TenantTokenOptions {
                key: Some(KEY.private_key_pem().unwrap()),
                key_version: "1".to_string(),
                tenant: "acme".to_string(),
                user: "alice".to_string(),
                everything: vec![],
                grants: vec![],
                ttl: None,
                output: None,
            },
            &SigilConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_private_key_from_config() {
        let dir = tempdir().unwrap();
        let (private_path, _) = write_keys(dir.path());
        let mut config = SigilConfig::default();
        config.keys.system_private_key_file = Some(private_path);

        let key = resolve_private_key(None, &config).unwrap();
        assert_eq!(&key.to_public_key(), KEY.public_key());
        assert!(resolve_private_key(None, &SigilConfig::default()).is_err());
    }

    #[test]
    fn test_inspect_token() {
        let token = tenant(
            TenantTokenOptions {
                key: Some(KEY.private_key_pem().unwrap()),
                key_version: "1".to_string(),
                tenant: "acme".to_string(),
                user: "alice".to_string(),
                everything: vec!["office-v1".to_string()],
                grants: vec![],
                ttl: Some("5m".to_string()),
                output: None,
            },
            &SigilConfig::default(),
        )
        .unwrap();

        inspect(token.into_string()).unwrap();
        assert!(inspect("not-a-token".to_string()).is_err());
    }
}
