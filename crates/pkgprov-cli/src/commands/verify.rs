//! `pkgprov verify`

use super::verifier;
use crate::config::{Backend, Config};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use pkgprov_core::{default_provenance_path, verify_package};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Path to the package archive
    pub package: PathBuf,
    /// Provenance file (default: <package>.prov)
    #[arg(long, value_name = "FILE")]
    pub prov: Option<PathBuf>,
    /// Signature backend (default: from config, else gpg)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,
    /// Trusted keys: a GnuPG keyring, or an Ed25519 keyring JSON file
    #[arg(long, value_name = "FILE")]
    pub keyring: Option<PathBuf>,
}

/// Handle `pkgprov verify`.
pub fn cmd_verify(args: VerifyArgs, config: &Config) -> Result<()> {
    let backend = args.backend.unwrap_or(config.backend);
    let verifier = verifier(backend, config, args.keyring.as_deref())?;
    let provenance = args
        .prov
        .unwrap_or_else(|| default_provenance_path(&args.package));

    let verified = verify_package(&args.package, &provenance, verifier.as_ref())
        .with_context(|| format!("verification of {} failed", args.package.display()))?;

    println!(
        "{} Signature valid (key {})",
        "✓".green().bold(),
        verified.signer_key_id
    );
    println!(
        "{} Digest matches {}",
        "✓".green().bold(),
        verified.digest
    );
    println!();
    println!("{}", "Summary:".bold().underline());
    println!("  {}: {}", "Package".bold(), verified.file_name);
    println!("  {}: {}", "Provenance".bold(), provenance.display());
    println!("  {}: {}", "Status".bold(), "VERIFIED".green().bold());
    Ok(())
}
