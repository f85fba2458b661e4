//! Package provenance: canonical manifests, clearsigned `.prov` documents and
//! their verification.
//!
//! A provenance manifest binds a package's embedded metadata document to the
//! SHA-256 digest of the package bytes. The manifest is clearsigned by a
//! [`Signer`] and later checked by a [`SignatureVerifier`] plus an
//! independent digest cross-check.
//!
//! # Example
//!
//! ```
//! use pkgprov_core::ProvenanceManifest;
//!
//! let digest = pkgprov_digest::digest(b"package bytes");
//! let manifest = ProvenanceManifest::new(b"name: foo\nversion: 0.1.0\n", "foo-0.1.0.tgz", digest);
//!
//! let text = std::str::from_utf8(manifest.as_bytes()).unwrap();
//! assert!(text.starts_with("name: foo\nversion: 0.1.0\n\n...\nfiles:\n  foo-0.1.0.tgz: sha256:"));
//! ```

mod archive;
mod clearsign;
mod gpg;
mod keys;
mod manifest;
mod sign;
mod signature;
mod verify;

pub use archive::{extract_metadata, ExtractionError, DEFAULT_METADATA_FILE};
pub use clearsign::{
    decode_envelope, encode_envelope, Ed25519Signer, Ed25519Verifier, Envelope,
};
pub use gpg::{GpgSigner, GpgVerifier};
pub use keys::{key_id, KeyError, KeyPair, Keyring};
pub use manifest::{
    checksum_line, package_file_name, BuildError, ManifestBuilder, ProvenanceManifest,
    DOCUMENT_END_MARKER,
};
pub use sign::{default_provenance_path, sign_package, SignPackageError, SignedPackage};
pub use signature::{
    PassphrasePolicy, SignError, SignOptions, SignatureError, SignatureVerifier, Signer,
    VerifiedDocument,
};
pub use verify::{verify_package, Verified, VerificationError};

/// Failure classes shared by the sign and verify paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Extraction,
    SignatureInvalid,
    SignatureUnknownKey,
    DigestMismatch,
    Other,
}

impl FailureKind {
    /// Process exit code for this failure class.
    pub fn exit_code(self) -> u8 {
        match self {
            FailureKind::Other => 1,
            FailureKind::Io => 2,
            FailureKind::Extraction => 3,
            FailureKind::SignatureInvalid => 4,
            FailureKind::SignatureUnknownKey => 5,
            FailureKind::DigestMismatch => 6,
        }
    }
}

impl BuildError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BuildError::Io { .. } | BuildError::InvalidFileName(_) => FailureKind::Io,
            BuildError::Extraction { .. } => FailureKind::Extraction,
        }
    }
}

impl SignPackageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SignPackageError::Build(err) => err.kind(),
            SignPackageError::Sign(_) => FailureKind::Other,
            SignPackageError::Write { .. } => FailureKind::Io,
        }
    }
}

impl VerificationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            VerificationError::Io { .. } | VerificationError::InvalidPackagePath(_) => {
                FailureKind::Io
            }
            VerificationError::SignatureInvalid(_) => FailureKind::SignatureInvalid,
            VerificationError::SignatureUnknownKey { .. } => FailureKind::SignatureUnknownKey,
            VerificationError::DigestMismatch { .. } => FailureKind::DigestMismatch,
        }
    }
}
