//! Sign pipeline: build the manifest, clearsign it, write the `.prov` file.

use crate::manifest::{BuildError, ManifestBuilder};
use crate::signature::{SignError, SignOptions, Signer};
use pkgprov_digest::Sha256Digest;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Extension appended to the package path for its provenance file.
pub const PROVENANCE_EXTENSION: &str = "prov";

/// Errors that can occur while signing a package.
#[derive(Debug, Error)]
pub enum SignPackageError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error("failed to write provenance file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a successful signing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPackage {
    pub provenance_path: PathBuf,
    pub digest: Sha256Digest,
}

/// `<package>.prov`, next to the package.
pub fn default_provenance_path(package: &Path) -> PathBuf {
    let mut path: OsString = package.as_os_str().to_owned();
    path.push(".");
    path.push(PROVENANCE_EXTENSION);
    PathBuf::from(path)
}

/// Build, sign and persist the provenance document for `package`.
///
/// The envelope only reaches `output` (or [`default_provenance_path`]) once
/// signing succeeded; it is written to a temporary file in the same
/// directory and renamed into place.
pub fn sign_package(
    package: &Path,
    output: Option<&Path>,
    builder: &ManifestBuilder,
    signer: &dyn Signer,
    options: &SignOptions,
) -> Result<SignedPackage, SignPackageError> {
    let manifest = builder.build(package)?;
    debug!(file = manifest.file_name(), "built provenance manifest");

    let signed = signer.clearsign(manifest.as_bytes(), options)?;

    let provenance_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_provenance_path(package));
    write_atomically(&provenance_path, &signed).map_err(|source| SignPackageError::Write {
        path: provenance_path.clone(),
        source,
    })?;

    info!(
        package = %package.display(),
        provenance = %provenance_path.display(),
        digest = %manifest.digest(),
        "signed package"
    );
    Ok(SignedPackage {
        provenance_path,
        digest: *manifest.digest(),
    })
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
