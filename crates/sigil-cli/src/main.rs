use clap::{Parser, Subcommand};
use sigil_core::{ApplicationName, SigilConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::token::{SystemTokenOptions, TenantTokenOptions, VerifyOptions};

#[derive(Parser, Debug)]
#[command(name = "sigil", version, about = "Sigil signed identity tokens")]
struct Cli {
    /// Path to sigil.yaml (defaults apply when omitted)
    #[arg(long, global = true, env = "SIGIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Key management
    Keys {
        #[command(subcommand)]
        cmd: KeysCommand,
    },

    /// Token minting, verification and inspection
    Token {
        #[command(subcommand)]
        cmd: TokenCommand,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Generate a new RSA key pair
    Generate {
        /// Directory to write private.pem and public.pem to (prints to stdout otherwise)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Key size in bits (defaults to keys.rsa_key_bits)
        #[arg(long)]
        bits: Option<usize>,

        /// Key version to announce (defaults to keys.system_key_version)
        #[arg(long)]
        key_version: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Mint a system token for one target application
    System {
        /// Private key file or PEM
        #[arg(long, env = "SIGIL_PRIVATE_KEY")]
        key: Option<String>,

        #[arg(long)]
        key_version: Option<String>,

        #[arg(long)]
        tenant: String,

        /// Target application, e.g. office-v1
        #[arg(long)]
        application: ApplicationName,

        /// Lifetime, e.g. 12h (defaults to tokens.system_token_ttl)
        #[arg(long)]
        ttl: Option<String>,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Mint a tenant token for a user
    Tenant {
        /// Tenant private key file or PEM
        #[arg(long, env = "SIGIL_PRIVATE_KEY")]
        key: Option<String>,

        #[arg(long, default_value = "1")]
        key_version: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        user: String,

        /// Grant every operation on an application (repeatable)
        #[arg(long)]
        everything: Vec<String>,

        /// Grant operations on a path: <path>=<OP>[,<OP>...] (repeatable)
        #[arg(long)]
        grant: Vec<String>,

        /// Lifetime, e.g. 10h (defaults to tokens.user_token_ttl)
        #[arg(long)]
        ttl: Option<String>,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Verify a token (system token unless --tenant is given)
    Verify {
        /// Public key file or PEM
        #[arg(long, env = "SIGIL_PUBLIC_KEY")]
        key: Option<String>,

        #[arg(long)]
        key_version: Option<String>,

        /// Application the verifier runs as, e.g. office-v1
        #[arg(long)]
        application: ApplicationName,

        #[arg(long)]
        tenant: Option<String>,

        /// Expected subject (defaults to the super-user for system tokens)
        #[arg(long)]
        user: Option<String>,

        /// Token or path to a file containing it
        token: String,
    },

    /// Decode a token without verifying it
    Inspect {
        /// Token or path to a file containing it
        token: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading configuration");
            SigilConfig::from_file(path)?
        }
        None => SigilConfig::default(),
    };

    match cli.cmd {
        Command::Keys { cmd } => match cmd {
            KeysCommand::Generate {
                output,
                bits,
                key_version,
            } => {
                let bits = bits.unwrap_or(config.keys.rsa_key_bits);
                let version = key_version.unwrap_or_else(|| config.keys.system_key_version.clone());
                commands::keys::generate(output, bits, &version)?
            }
        },

        Command::Token { cmd } => match cmd {
            TokenCommand::System {
                key,
                key_version,
                tenant,
                application,
                ttl,
                output,
            } => {
                commands::token::system(
                    SystemTokenOptions {
                        key,
                        key_version,
                        tenant,
                        application,
                        ttl,
                        output,
                    },
                    &config,
                )?;
            }
            TokenCommand::Tenant {
                key,
                key_version,
                tenant,
                user,
                everything,
                grant,
                ttl,
                output,
            } => {
                commands::token::tenant(
                    TenantTokenOptions {
                        key,
                        key_version,
                        tenant,
                        user,
                        everything,
                        grants: grant,
                        ttl,
                        output,
                    },
                    &config,
                )?;
            }
            TokenCommand::Verify {
                key,
                key_version,
                application,
                tenant,
                user,
                token,
            } => {
                commands::token::verify(
                    VerifyOptions {
                        key,
                        key_version,
                        application,
                        tenant,
                        user,
                        token,
                    },
                    &config,
                )?;
            }
            TokenCommand::Inspect { token } => commands::token::inspect(token)?,
        },
    }

    Ok(())
}
