//! Ed25519 key pairs and keyrings for the built-in clearsign backend.

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading, saving or generating keys.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid key file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid key material for {key_id}: {reason}")]
    InvalidKey { key_id: String, reason: String },

    #[error("failed to gather randomness: {0}")]
    Entropy(String),

    #[error("failed to serialize key data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key identifier: the first 8 bytes of SHA-256 over the public key, as
/// 16 uppercase hex characters.
pub fn key_id(public_key: &VerifyingKey) -> String {
    let digest = pkgprov_digest::digest(public_key.as_bytes());
    hex::encode_upper(&digest.as_bytes()[..8])
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyPairFile {
    key_id: String,
    private_key: String,
    public_key: String,
    created: DateTime<Utc>,
}

/// An Ed25519 signing key with its derived identifier.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    key_id: String,
    created: DateTime<Utc>,
}

impl KeyPair {
    /// Generate a fresh key pair from OS randomness.
    pub fn generate() -> Result<Self, KeyError> {
        let mut secret = [0u8; 32];
        getrandom::fill(&mut secret).map_err(|e| KeyError::Entropy(e.to_string()))?;
        Ok(Self::from_secret_bytes(&secret))
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let key_id = key_id(&signing_key.verifying_key());
        Self {
            signing_key,
            key_id,
            created: Utc::now(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Load a key pair written by [`KeyPair::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, KeyError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: KeyPairFile = serde_json::from_str(&contents).map_err(|source| KeyError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let secret: [u8; 32] = decode_key_hex(&file.key_id, &file.private_key)?;
        let signing_key = SigningKey::from_bytes(&secret);
        let public = signing_key.verifying_key();

        if hex::encode(public.to_bytes()) != file.public_key.to_ascii_lowercase() {
            return Err(KeyError::InvalidKey {
                key_id: file.key_id,
                reason: "public key does not match private key".to_string(),
            });
        }
        let derived = key_id(&public);
        if !derived.eq_ignore_ascii_case(&file.key_id) {
            return Err(KeyError::InvalidKey {
                key_id: file.key_id,
                reason: format!("key id does not match public key (expected {derived})"),
            });
        }

        Ok(Self {
            signing_key,
            key_id: derived,
            created: file.created,
        })
    }

    /// Write the key pair as JSON, readable only by the owner on Unix.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), KeyError> {
        let path = path.as_ref();
        let file = KeyPairFile {
            key_id: self.key_id.clone(),
            private_key: self.secret_key_hex(),
            public_key: self.public_key_hex(),
            created: self.created,
        };
        let json = serde_json::to_string_pretty(&file)?;
        write_file(path, json.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
                KeyError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

/// Trusted public keys, indexed by key id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyring {
    keys: BTreeMap<String, VerifyingKey>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a public key and return its id.
    pub fn insert(&mut self, public_key: VerifyingKey) -> String {
        let id = key_id(&public_key);
        self.keys.insert(id.clone(), public_key);
        id
    }

    /// Look up a key by id, ignoring hex case.
    pub fn get(&self, key_id: &str) -> Option<&VerifyingKey> {
        self.keys.get(&key_id.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Load a keyring from a JSON object mapping key ids to hex public keys.
    ///
    /// Every entry must be a valid Ed25519 public key whose derived id
    /// matches the entry's id.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, KeyError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&contents).map_err(|source| KeyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut keyring = Self::new();
        for (id, hex_key) in entries {
            let bytes: [u8; 32] = decode_key_hex(&id, &hex_key)?;
            let public = VerifyingKey::from_bytes(&bytes).map_err(|e| KeyError::InvalidKey {
                key_id: id.clone(),
                reason: e.to_string(),
            })?;
            let derived = keyring.insert(public);
            if !derived.eq_ignore_ascii_case(&id) {
                return Err(KeyError::InvalidKey {
                    key_id: id,
                    reason: format!("key id does not match public key (expected {derived})"),
                });
            }
        }
        Ok(keyring)
    }

    /// Save the keyring as a JSON object mapping key ids to hex public keys.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), KeyError> {
        let entries: BTreeMap<&str, String> = self
            .keys
            .iter()
            .map(|(id, key)| (id.as_str(), hex::encode(key.to_bytes())))
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        write_file(path.as_ref(), json.as_bytes())
    }
}

fn decode_key_hex<const N: usize>(key_id: &str, hex_key: &str) -> Result<[u8; N], KeyError> {
    let mut bytes = [0u8; N];
    hex::decode_to_slice(hex_key, &mut bytes).map_err(|e| KeyError::InvalidKey {
        key_id: key_id.to_string(),
        reason: format!("expected {N} hex-encoded bytes: {e}"),
    })?;
    Ok(bytes)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), KeyError> {
    fs::write(path, bytes).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
