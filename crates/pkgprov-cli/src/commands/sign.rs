//! `pkgprov sign`

use super::{manifest_builder, signer};
use crate::config::{Backend, Config};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use pkgprov_core::{sign_package, PassphrasePolicy, SignOptions};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct SignArgs {
    /// Path to the package archive
    pub package: PathBuf,
    /// Signing key selector (GnuPG user or key id, or Ed25519 key id)
    #[arg(short = 'u', long)]
    pub key: Option<String>,
    /// Never prompt on the terminal
    #[arg(long)]
    pub batch: bool,
    /// Read the key passphrase from a file (implies --batch)
    #[arg(long, value_name = "FILE")]
    pub passphrase_file: Option<PathBuf>,
    /// Signing backend (default: from config, else gpg)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,
    /// Ed25519 key pair file written by `pkgprov keygen`
    #[arg(long, value_name = "FILE")]
    pub secret_key: Option<PathBuf>,
    /// Where to write the provenance file (default: <package>.prov)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Handle `pkgprov sign`.
pub fn cmd_sign(args: SignArgs, config: &Config) -> Result<()> {
    let backend = args.backend.unwrap_or(config.backend);
    let signer = signer(backend, config, args.secret_key.as_deref())?;

    let passphrase = match &args.passphrase_file {
        Some(path) => PassphrasePolicy::Batch {
            passphrase: Some(read_passphrase(path)?),
        },
        None if args.batch => PassphrasePolicy::Batch { passphrase: None },
        None => PassphrasePolicy::Interactive,
    };
    let options = SignOptions {
        key: args.key.or_else(|| config.key.clone()),
        passphrase,
    };

    let signed = sign_package(
        &args.package,
        args.output.as_deref(),
        &manifest_builder(config),
        signer.as_ref(),
        &options,
    )
    .with_context(|| format!("failed to sign {}", args.package.display()))?;

    println!(
        "{} Signed {}",
        "✓".green().bold(),
        args.package.display()
    );
    println!("  {}: {}", "Digest".bold(), signed.digest);
    println!(
        "  {}: {}",
        "Provenance".bold(),
        signed.provenance_path.display()
    );
    Ok(())
}

/// Read a passphrase file, dropping a single trailing line ending.
pub(crate) fn read_passphrase(path: &Path) -> Result<String> {
    let mut passphrase = fs::read_to_string(path)
        .with_context(|| format!("failed to read passphrase file {}", path.display()))?;
    if passphrase.ends_with('\n') {
        passphrase.pop();
        if passphrase.ends_with('\r') {
            passphrase.pop();
        }
    }
    Ok(passphrase)
}
