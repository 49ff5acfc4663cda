//! Key management commands.
//!
//! `sigil keys generate` - Generate a new RSA signing key pair.

use sigil_token::KeyPairHolder;
use std::fs;
use std::path::PathBuf;

/// Generate a new RSA key pair.
pub fn generate(output: Option<PathBuf>, bits: usize, version: &str) -> anyhow::Result<()> {
    let key_pair = KeyPairHolder::generate("system", version, bits)?;

    if let Some(output_dir) = output {
        fs::create_dir_all(&output_dir)?;

        let private_path = output_dir.join("private.pem");
        let public_path = output_dir.join("public.pem");
        key_pair.save_to_files(&private_path, &public_path)?;

        println!("✔ Generated {bits}-bit RSA key pair (version {version}):");
        println!("  Private key: {}", private_path.display());
        println!("  Public key:  {}", public_path.display());
        println!();
        println!("⚠️  Keep your private key secure! Never commit it to version control.");
        println!();
        println!("Reference it from sigil.yaml:");
        println!("  keys:");
        println!("    system_key_version: \"{version}\"");
        println!("    system_private_key_file: {}", private_path.display());
        println!("    system_public_key_file: {}", public_path.display());
    } else {
        println!("{}", key_pair.private_key_pem()?);
        println!("{}", key_pair.public_key_pem()?);
        println!("Use --output <dir> to save keys to files.");
    }

    Ok(())
}
