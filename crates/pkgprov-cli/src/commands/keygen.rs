//! `pkgprov keygen`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use pkgprov_core::{KeyPair, Keyring};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct KeygenArgs {
    /// Output path for the key pair (default: prints to stdout)
    pub output: Option<PathBuf>,
    /// Also add the public key to this keyring file, creating it if needed
    #[arg(long, value_name = "FILE")]
    pub keyring: Option<PathBuf>,
}

/// Handle `pkgprov keygen`.
pub fn cmd_keygen(args: KeygenArgs) -> Result<()> {
    let key_pair = KeyPair::generate().context("failed to generate key pair")?;

    if let Some(path) = &args.output {
        key_pair
            .save(path)
            .with_context(|| format!("failed to write key pair to {}", path.display()))?;
        println!(
            "{} Key pair {} written to {}",
            "✓".green().bold(),
            key_pair.key_id().cyan(),
            path.display()
        );
    } else {
        println!("{}", "Generated Ed25519 Key Pair".bold().underline());
        println!("{}: {}", "Key ID".bold(), key_pair.key_id());
        println!("{}: {}", "Created".bold(), key_pair.created().to_rfc3339());
        println!("{}: {}", "Private Key".bold().red(), key_pair.secret_key_hex());
        println!("{}: {}", "Public Key".bold().green(), key_pair.public_key_hex());
        println!();
        println!(
            "{}",
            "WARNING: Keep the private key secret!".yellow().bold()
        );
    }

    if let Some(path) = &args.keyring {
        let mut keyring = if path.exists() {
            Keyring::load(path)
                .with_context(|| format!("failed to load keyring from {}", path.display()))?
        } else {
            Keyring::new()
        };
        keyring.insert(key_pair.verifying_key());
        keyring
            .save(path)
            .with_context(|| format!("failed to write keyring to {}", path.display()))?;
        println!(
            "{} Added {} to keyring {} ({} keys)",
            "✓".green().bold(),
            key_pair.key_id().cyan(),
            path.display(),
            keyring.len()
        );
    }

    Ok(())
}
