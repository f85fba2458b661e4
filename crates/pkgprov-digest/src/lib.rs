//! SHA-256 content digests for package archives.
//!
//! Digests are rendered as `sha256:<64 lowercase hex chars>`, the form embedded
//! in provenance manifests. Hashing a file yields the same digest however the
//! file is chunked while reading.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Algorithm prefix used in the textual form.
pub const ALGORITHM_PREFIX: &str = "sha256:";

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Errors produced when parsing a textual digest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestParseError {
    #[error("digest must start with '{ALGORITHM_PREFIX}': {0}")]
    MissingPrefix(String),

    #[error("digest must be 64 lowercase hex characters: {0}")]
    InvalidHex(String),
}

/// A SHA-256 digest of raw package bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex without the algorithm prefix.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ALGORITHM_PREFIX}{}", self.hex())
    }
}

impl FromStr for Sha256Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix(ALGORITHM_PREFIX)
            .ok_or_else(|| DigestParseError::MissingPrefix(s.to_string()))?;

        // Uppercase hex would decode fine but is not canonical.
        if hex_part.len() != 64
            || !hex_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(DigestParseError::InvalidHex(s.to_string()));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|_| DigestParseError::InvalidHex(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// Compute the SHA-256 digest of a byte slice.
pub fn digest(bytes: &[u8]) -> Sha256Digest {
    Sha256Digest(Sha256::digest(bytes).into())
}

/// Lowercase hex SHA-256 of a byte slice, without prefix.
pub fn hex_digest(bytes: &[u8]) -> String {
    digest(bytes).hex()
}

/// Compute the digest of everything a reader yields.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<Sha256Digest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(Sha256Digest(hasher.finalize().into()))
}

/// Compute the digest of a file's contents.
pub fn digest_file<P: AsRef<Path>>(path: P) -> io::Result<Sha256Digest> {
    let file = File::open(path)?;
    digest_reader(BufReader::new(file))
}
