//! Canonical provenance manifest construction.
//!
//! The manifest is the exact plaintext that gets signed:
//!
//! ```text
//! <metadata document, verbatim>
//! ...
//! files:
//!   <package file name>: sha256:<hex>
//! ```
//!
//! It is a pure function of the metadata bytes, the package file name and the
//! package digest.

use crate::archive::{extract_metadata, ExtractionError, DEFAULT_METADATA_FILE};
use camino::Utf8Path;
use pkgprov_digest::{digest, Sha256Digest};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Document-end marker separating the metadata from the file list.
pub const DOCUMENT_END_MARKER: &str = "...";

/// Errors that can occur while building a manifest from a package file.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read package {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("package path has no UTF-8 file name: {}", .0.display())]
    InvalidFileName(PathBuf),

    #[error("failed to extract metadata from {}: {source}", .path.display())]
    Extraction {
        path: PathBuf,
        #[source]
        source: ExtractionError,
    },
}

/// The canonical plaintext binding package metadata to its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceManifest {
    file_name: String,
    digest: Sha256Digest,
    bytes: Vec<u8>,
}

impl ProvenanceManifest {
    /// Assemble the manifest from its three inputs.
    pub fn new(metadata: &[u8], file_name: &str, digest: Sha256Digest) -> Self {
        let line = checksum_line(file_name, &digest);
        let mut bytes = Vec::with_capacity(metadata.len() + line.len() + 16);
        bytes.extend_from_slice(metadata);
        bytes.push(b'\n');
        bytes.extend_from_slice(DOCUMENT_END_MARKER.as_bytes());
        bytes.extend_from_slice(b"\nfiles:\n");
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        Self {
            file_name: file_name.to_string(),
            digest,
            bytes,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// The bit-exact checksum line: two spaces, file name, colon, digest.
pub fn checksum_line(file_name: &str, digest: &Sha256Digest) -> String {
    format!("  {file_name}: {digest}")
}

/// Base file name of a package path, used as the key in the `files:` map.
pub fn package_file_name(path: &Path) -> Option<&str> {
    Utf8Path::from_path(path)?.file_name()
}

/// Builds provenance manifests from package files on disk.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    metadata_file: String,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            metadata_file: DEFAULT_METADATA_FILE.to_string(),
        }
    }

    /// Override the file name of the embedded metadata document.
    pub fn metadata_file(mut self, file_name: impl Into<String>) -> Self {
        self.metadata_file = file_name.into();
        self
    }

    /// Read the package, digest it and assemble its manifest.
    ///
    /// The package is read once; the digest and the metadata come from the
    /// same bytes.
    pub fn build<P: AsRef<Path>>(&self, package: P) -> Result<ProvenanceManifest, BuildError> {
        let path = package.as_ref();
        let file_name = package_file_name(path)
            .ok_or_else(|| BuildError::InvalidFileName(path.to_path_buf()))?;

        let bytes = fs::read(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let package_digest = digest(&bytes);
        debug!(package = %path.display(), digest = %package_digest, "computed package digest");

        let metadata = extract_metadata(&bytes, &self.metadata_file).map_err(|source| {
            BuildError::Extraction {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(ProvenanceManifest::new(&metadata, file_name, package_digest))
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_digest() -> Sha256Digest {
        digest(b"abc")
    }

    #[test]
    fn test_manifest_layout() {
        let manifest = ProvenanceManifest::new(
            b"name: foo\nversion: 0.1.0\n",
            "foo-0.1.0.tgz",
            abc_digest(),
        );

        let expected = "name: foo\nversion: 0.1.0\n\n...\nfiles:\n  foo-0.1.0.tgz: \
            sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\n";
        assert_eq!(std::str::from_utf8(manifest.as_bytes()).unwrap(), expected);
    }

    #[test]
    fn test_manifest_deterministic() {
        let a = ProvenanceManifest::new(b"name: foo\n", "foo.tgz", abc_digest());
        let b = ProvenanceManifest::new(b"name: foo\n", "foo.tgz", abc_digest());
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_metadata_without_trailing_newline() {
        let manifest = ProvenanceManifest::new(b"name: foo", "foo.tgz", abc_digest());
        let text = String::from_utf8(manifest.into_bytes()).unwrap();
        assert!(text.starts_with("name: foo\n...\nfiles:\n"));
    }

    #[test]
    fn test_checksum_line_format() {
        let line = checksum_line("foo-0.1.0.tgz", &abc_digest());
        assert!(line.starts_with("  foo-0.1.0.tgz: sha256:"));
        assert_eq!(line.len(), 2 + "foo-0.1.0.tgz: sha256:".len() + 64);
        assert_eq!(line, line.trim_end());
    }

    #[test]
    fn test_package_file_name() {
        assert_eq!(
            package_file_name(Path::new("/tmp/charts/foo-0.1.0.tgz")),
            Some("foo-0.1.0.tgz")
        );
        assert_eq!(package_file_name(Path::new("foo.tgz")), Some("foo.tgz"));
        assert_eq!(package_file_name(Path::new("/")), None);
    }

    #[test]
    fn test_build_missing_package() {
        let err = ManifestBuilder::new()
            .build("/nonexistent/pkgprov/foo-0.1.0.tgz")
            .unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }
}
