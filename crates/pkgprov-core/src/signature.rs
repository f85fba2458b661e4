//! Signer and verifier capabilities.
//!
//! The core never signs or checks signatures itself. It hands the manifest
//! to a [`Signer`] and asks a [`SignatureVerifier`] about the provenance file.
//! Backends live in [`crate::clearsign`] (built-in Ed25519) and
//! [`crate::gpg`] (GnuPG).

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How the signer obtains the secret key passphrase.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum PassphrasePolicy {
    /// Prompt on the controlling terminal.
    #[default]
    Interactive,
    /// No terminal interaction, optionally with an explicit passphrase.
    Batch { passphrase: Option<String> },
}

impl fmt::Debug for PassphrasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => f.write_str("Interactive"),
            Self::Batch { passphrase } => f
                .debug_struct("Batch")
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Options passed to a [`Signer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Explicit signing key selector; the backend default when `None`.
    pub key: Option<String>,
    pub passphrase: PassphrasePolicy,
}

/// Plaintext recovered from a clearsigned document whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDocument {
    pub signer_key_id: String,
    pub plaintext: Vec<u8>,
}

/// Errors reported by a [`Signer`].
#[derive(Debug, Error)]
pub enum SignError {
    #[error("signing key not found: {0}")]
    KeyNotFound(String),

    #[error("failed to run signer {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("signer failed: {0}")]
    Backend(String),
}

/// Errors reported by a [`SignatureVerifier`].
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("failed to read signed document {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed signed document: {0}")]
    Malformed(String),

    #[error("signature by key {key_id} failed verification")]
    BadSignature { key_id: String },

    #[error("signing key {0} is not in the keyring")]
    UnknownKey(String),

    #[error("signature check failed: {0}")]
    Backend(String),
}

/// Produces a clearsigned envelope around a plaintext.
pub trait Signer {
    fn clearsign(&self, plaintext: &[u8], options: &SignOptions) -> Result<Vec<u8>, SignError>;
}

/// Checks a clearsigned document against a trust store.
pub trait SignatureVerifier {
    fn check_signature(&self, signed_document: &Path) -> Result<VerifiedDocument, SignatureError>;
}
