//! `pkgprov manifest` and `pkgprov digest`: print without signing.

use super::manifest_builder;
use crate::config::Config;
use anyhow::{Context, Result};
use pkgprov_digest::digest_file;
use std::io::{self, Write};
use std::path::Path;

/// Write the canonical manifest bytes for `package` to stdout.
pub fn cmd_manifest(package: &Path, config: &Config) -> Result<()> {
    let manifest = manifest_builder(config)
        .build(package)
        .with_context(|| format!("failed to build manifest for {}", package.display()))?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(manifest.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Print the `sha256:<hex>` digest of `package`.
pub fn cmd_digest(package: &Path) -> Result<()> {
    let digest = digest_file(package)
        .with_context(|| format!("failed to read {}", package.display()))?;
    println!("{digest}");
    Ok(())
}
