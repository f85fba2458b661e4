//! Subcommand handlers and the backend wiring they share.

pub mod inspect;
pub mod keygen;
pub mod sign;
pub mod verify;

use crate::config::{Backend, Config};
use anyhow::{Context, Result};
use pkgprov_core::{
    BuildError, Ed25519Signer, Ed25519Verifier, FailureKind, GpgSigner, GpgVerifier, KeyPair,
    Keyring, ManifestBuilder, SignPackageError, SignatureVerifier, Signer, VerificationError,
};
use std::io;
use std::path::Path;

/// Exit code for an error returned by a command handler.
///
/// Looks through the context chain for a library error that carries a
/// failure class; anything else is a generic failure.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<VerificationError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<SignPackageError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<BuildError>() {
            Some(e.kind())
        } else {
            cause.downcast_ref::<io::Error>().map(|_| FailureKind::Io)
        }
    });
    kind.unwrap_or(FailureKind::Other).exit_code()
}

pub(crate) fn manifest_builder(config: &Config) -> ManifestBuilder {
    match &config.metadata_file {
        Some(name) => ManifestBuilder::new().metadata_file(name.clone()),
        None => ManifestBuilder::new(),
    }
}

pub(crate) fn signer(
    backend: Backend,
    config: &Config,
    secret_key: Option<&Path>,
) -> Result<Box<dyn Signer>> {
    match backend {
        Backend::Gpg => {
            let mut signer = GpgSigner::new();
            if let Some(program) = &config.gpg.program {
                signer = signer.with_program(program);
            }
            if let Some(homedir) = &config.gpg.homedir {
                signer = signer.with_homedir(homedir);
            }
            Ok(Box::new(signer))
        }
        Backend::Ed25519 => {
            let path = secret_key
                .or(config.secret_key.as_deref())
                .context("the ed25519 backend needs --secret-key or `secret_key` in the config")?;
            let key_pair = KeyPair::load(path)
                .with_context(|| format!("failed to load signing key from {}", path.display()))?;
            Ok(Box::new(Ed25519Signer::new(key_pair)))
        }
    }
}

pub(crate) fn verifier(
    backend: Backend,
    config: &Config,
    keyring: Option<&Path>,
) -> Result<Box<dyn SignatureVerifier>> {
    let keyring = keyring.or(config.keyring.as_deref());
    match backend {
        Backend::Gpg => {
            let mut verifier = GpgVerifier::new();
            if let Some(program) = &config.gpg.program {
                verifier = verifier.with_program(program);
            }
            if let Some(homedir) = &config.gpg.homedir {
                verifier = verifier.with_homedir(homedir);
            }
            if let Some(keyring) = keyring {
                verifier = verifier.with_keyring(keyring);
            }
            Ok(Box::new(verifier))
        }
        Backend::Ed25519 => {
            let path = keyring
                .context("the ed25519 backend needs --keyring or `keyring` in the config")?;
            let keyring = Keyring::load(path)
                .with_context(|| format!("failed to load keyring from {}", path.display()))?;
            Ok(Box::new(Ed25519Verifier::new(keyring)))
        }
    }
}
