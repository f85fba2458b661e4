//! Provenance verification.
//!
//! Verification runs three stages and stops at the first failure:
//!
//! 1. The signature of the provenance document is checked by a
//!    [`SignatureVerifier`]. This stage never looks at the manifest content.
//! 2. The package digest is recomputed from the package bytes.
//! 3. The verified plaintext must contain the exact checksum line for the
//!    package file name and the recomputed digest.
//!
//! Both the signature and the checksum line must hold. A valid signature over
//! a stale manifest fails stage 3.

use crate::manifest::{checksum_line, package_file_name};
use crate::signature::{SignatureError, SignatureVerifier};
use pkgprov_digest::{digest_file, Sha256Digest};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during provenance verification.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("package path has no UTF-8 file name: {}", .0.display())]
    InvalidPackagePath(PathBuf),

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("signing key {key_id} is not in the keyring")]
    SignatureUnknownKey { key_id: String },

    #[error(
        "digest mismatch for {file_name}: expected {}, computed {computed}",
        .expected.as_deref().unwrap_or("<no entry>")
    )]
    DigestMismatch {
        file_name: String,
        expected: Option<String>,
        computed: Sha256Digest,
    },
}

impl From<SignatureError> for VerificationError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Io { path, source } => Self::Io { path, source },
            SignatureError::UnknownKey(key_id) => Self::SignatureUnknownKey { key_id },
            other @ (SignatureError::Malformed(_)
            | SignatureError::BadSignature { .. }
            | SignatureError::Backend(_)) => Self::SignatureInvalid(other.to_string()),
        }
    }
}

/// A package whose provenance checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub file_name: String,
    pub digest: Sha256Digest,
    pub signer_key_id: String,
}

/// Verify `package` against the provenance document at `provenance`.
pub fn verify_package(
    package: &Path,
    provenance: &Path,
    verifier: &dyn SignatureVerifier,
) -> Result<Verified, VerificationError> {
    let file_name = package_file_name(package)
        .ok_or_else(|| VerificationError::InvalidPackagePath(package.to_path_buf()))?
        .to_string();

    debug!(provenance = %provenance.display(), "checking provenance signature");
    let document = verifier.check_signature(provenance).map_err(|err| {
        warn!(provenance = %provenance.display(), error = %err, "signature check failed");
        VerificationError::from(err)
    })?;

    debug!(package = %package.display(), "recomputing package digest");
    let computed = digest_file(package).map_err(|source| VerificationError::Io {
        path: package.to_path_buf(),
        source,
    })?;

    let plaintext = String::from_utf8_lossy(&document.plaintext);
    let expected_line = checksum_line(&file_name, &computed);
    if !plaintext.lines().any(|line| line == expected_line) {
        let expected = declared_digest(&plaintext, &file_name);
        warn!(
            file = %file_name,
            expected = expected.as_deref().unwrap_or("<no entry>"),
            computed = %computed,
            "package digest does not match provenance"
        );
        return Err(VerificationError::DigestMismatch {
            file_name,
            expected,
            computed,
        });
    }

    info!(
        file = %file_name,
        digest = %computed,
        signer = %document.signer_key_id,
        "verified package"
    );
    Ok(Verified {
        file_name,
        digest: computed,
        signer_key_id: document.signer_key_id,
    })
}

/// The digest a manifest declares for `file_name`, for error reporting only.
fn declared_digest(plaintext: &str, file_name: &str) -> Option<String> {
    let prefix = format!("  {file_name}: ");
    plaintext
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(str::to_string)
}
