//! Built-in Ed25519 clearsign backend.
//!
//! The envelope follows the cleartext signature framework layout: armor
//! headers, the dash-escaped plaintext, then a signature block. The line
//! break directly before the signature block belongs to the framing, not to
//! the plaintext, so any plaintext round-trips byte-for-byte.
//!
//! ```text
//! -----BEGIN PKGPROV SIGNED MESSAGE-----
//! Hash: SHA256
//! Key: 0123456789ABCDEF
//!
//! <dash-escaped plaintext>
//! -----BEGIN PKGPROV SIGNATURE-----
//! <hex Ed25519 signature over sha256(plaintext)>
//! -----END PKGPROV SIGNATURE-----
//! ```

use crate::keys::{KeyPair, Keyring};
use crate::signature::{
    PassphrasePolicy, SignError, SignOptions, SignatureError, SignatureVerifier, Signer,
    VerifiedDocument,
};
use ed25519_dalek::Signer as _;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const BEGIN_MESSAGE: &str = "-----BEGIN PKGPROV SIGNED MESSAGE-----";
pub const BEGIN_SIGNATURE: &str = "-----BEGIN PKGPROV SIGNATURE-----";
pub const END_SIGNATURE: &str = "-----END PKGPROV SIGNATURE-----";
const HASH_NAME: &str = "SHA256";
const SIGNATURE_LINE_WIDTH: usize = 64;

/// A decoded, not yet verified, envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub key_id: String,
    pub plaintext: Vec<u8>,
    pub signature: [u8; 64],
}

/// Wrap a plaintext and its signature into an envelope.
pub fn encode_envelope(plaintext: &[u8], key_id: &str, signature: &[u8; 64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(plaintext.len() + 320);
    out.extend_from_slice(BEGIN_MESSAGE.as_bytes());
    out.extend_from_slice(format!("\nHash: {HASH_NAME}\nKey: {key_id}\n\n").as_bytes());

    for line in plaintext.split_inclusive(|&b| b == b'\n') {
        if line.first() == Some(&b'-') {
            out.extend_from_slice(b"- ");
        }
        out.extend_from_slice(line);
    }
    out.push(b'\n');

    out.extend_from_slice(BEGIN_SIGNATURE.as_bytes());
    out.push(b'\n');
    for chunk in hex::encode(signature).as_bytes().chunks(SIGNATURE_LINE_WIDTH) {
        out.extend_from_slice(chunk);
        out.push(b'\n');
    }
    out.extend_from_slice(END_SIGNATURE.as_bytes());
    out.push(b'\n');
    out
}

/// Parse an envelope without checking its signature.
pub fn decode_envelope(document: &[u8]) -> Result<Envelope, SignatureError> {
    let mut lines = document.split_inclusive(|&b| b == b'\n');

    match lines.next() {
        Some(line) if trim_eol(line) == BEGIN_MESSAGE.as_bytes() => {}
        _ => return Err(malformed("missing signed message header")),
    }

    let mut hash = None;
    let mut key_id = None;
    loop {
        let line = trim_eol(
            lines
                .next()
                .ok_or_else(|| malformed("unterminated armor headers"))?,
        );
        if line.is_empty() {
            break;
        }
        let text =
            std::str::from_utf8(line).map_err(|_| malformed("armor header is not UTF-8"))?;
        let (name, value) = text
            .split_once(": ")
            .ok_or_else(|| malformed(format!("invalid armor header '{text}'")))?;
        match name {
            "Hash" => hash = Some(value.to_string()),
            "Key" => key_id = Some(value.to_string()),
            other => return Err(malformed(format!("unknown armor header '{other}'"))),
        }
    }
    if hash.as_deref() != Some(HASH_NAME) {
        return Err(malformed("missing or unsupported Hash header"));
    }
    let key_id = key_id.ok_or_else(|| malformed("missing Key header"))?;

    let mut plaintext = Vec::new();
    let mut signature_started = false;
    for line in lines.by_ref() {
        if trim_eol(line) == BEGIN_SIGNATURE.as_bytes() {
            signature_started = true;
            break;
        }
        if let Some(rest) = line.strip_prefix(b"- ") {
            plaintext.extend_from_slice(rest);
        } else if line.first() == Some(&b'-') {
            return Err(malformed("unescaped dash line in message body"));
        } else {
            plaintext.extend_from_slice(line);
        }
    }
    if !signature_started {
        return Err(malformed("missing signature block"));
    }
    if plaintext.pop() != Some(b'\n') {
        return Err(malformed("message body must end with a line break"));
    }

    let mut signature_hex = String::new();
    let mut signature_ended = false;
    for line in lines.by_ref() {
        let line = trim_eol(line);
        if line == END_SIGNATURE.as_bytes() {
            signature_ended = true;
            break;
        }
        let text =
            std::str::from_utf8(line).map_err(|_| malformed("signature block is not UTF-8"))?;
        signature_hex.push_str(text.trim());
    }
    if !signature_ended {
        return Err(malformed("unterminated signature block"));
    }
    if lines.any(|line| !trim_eol(line).is_empty()) {
        return Err(malformed("trailing data after signature block"));
    }

    let mut signature = [0u8; 64];
    hex::decode_to_slice(&signature_hex, &mut signature)
        .map_err(|e| malformed(format!("invalid signature encoding: {e}")))?;

    Ok(Envelope {
        key_id,
        plaintext,
        signature,
    })
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn malformed(reason: impl Into<String>) -> SignatureError {
    SignatureError::Malformed(reason.into())
}

/// Signs with a single Ed25519 key pair.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    key_pair: KeyPair,
}

impl Ed25519Signer {
    pub fn new(key_pair: KeyPair) -> Self {
        Self { key_pair }
    }

    pub fn key_id(&self) -> &str {
        self.key_pair.key_id()
    }
}

impl Signer for Ed25519Signer {
    fn clearsign(&self, plaintext: &[u8], options: &SignOptions) -> Result<Vec<u8>, SignError> {
        if let Some(selector) = &options.key {
            if !selector.eq_ignore_ascii_case(self.key_pair.key_id()) {
                return Err(SignError::KeyNotFound(selector.clone()));
            }
        }
        if let PassphrasePolicy::Batch {
            passphrase: Some(_),
        } = &options.passphrase
        {
            debug!("ignoring passphrase: ed25519 key pairs are stored unencrypted");
        }

        let hash = pkgprov_digest::digest(plaintext);
        let signature = self.key_pair.signing_key().sign(hash.as_bytes());
        debug!(key_id = %self.key_pair.key_id(), "clearsigned plaintext");
        Ok(encode_envelope(
            plaintext,
            self.key_pair.key_id(),
            &signature.to_bytes(),
        ))
    }
}

/// Verifies envelopes against a [`Keyring`].
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    keyring: Keyring,
}

impl Ed25519Verifier {
    pub fn new(keyring: Keyring) -> Self {
        Self { keyring }
    }

    /// Verify an in-memory envelope.
    pub fn check_document(&self, document: &[u8]) -> Result<VerifiedDocument, SignatureError> {
        let envelope = decode_envelope(document)?;
        let public_key = self
            .keyring
            .get(&envelope.key_id)
            .ok_or_else(|| SignatureError::UnknownKey(envelope.key_id.clone()))?;

        let signature = ed25519_dalek::Signature::from_bytes(&envelope.signature);
        let hash = pkgprov_digest::digest(&envelope.plaintext);
        public_key
            .verify_strict(hash.as_bytes(), &signature)
            .map_err(|_| SignatureError::BadSignature {
                key_id: envelope.key_id.clone(),
            })?;

        Ok(VerifiedDocument {
            signer_key_id: envelope.key_id,
            plaintext: envelope.plaintext,
        })
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn check_signature(&self, signed_document: &Path) -> Result<VerifiedDocument, SignatureError> {
        let document = fs::read(signed_document).map_err(|source| SignatureError::Io {
            path: signed_document.to_path_buf(),
            source,
        })?;
        self.check_document(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer_and_verifier() -> (Ed25519Signer, Ed25519Verifier) {
        let pair = KeyPair::from_secret_bytes(&[42u8; 32]);
        let mut keyring = Keyring::new();
        keyring.insert(pair.verifying_key());
        (Ed25519Signer::new(pair), Ed25519Verifier::new(keyring))
    }

    fn sign(signer: &Ed25519Signer, plaintext: &[u8]) -> Vec<u8> {
        signer.clearsign(plaintext, &SignOptions::default()).unwrap()
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let (signer, verifier) = signer_and_verifier();
        let plaintext = b"name: foo\n\n...\nfiles:\n  foo.tgz: sha256:00\n";

        let verified = verifier.check_document(&sign(&signer, plaintext)).unwrap();
        assert_eq!(verified.plaintext, plaintext);
        assert_eq!(verified.signer_key_id, signer.key_id());
    }

    #[test]
    fn test_plaintext_edge_cases_round_trip() {
        let (signer, verifier) = signer_and_verifier();
        let cases: [&[u8]; 6] = [
            b"",
            b"no trailing newline",
            b"\n\n",
            b"---\nname: foo\n",
            b"- already escaped looking\n-----BEGIN PKGPROV SIGNATURE-----\n",
            b"crlf\r\nlines\r\n",
        ];

        for plaintext in cases {
            let verified = verifier.check_document(&sign(&signer, plaintext)).unwrap();
            assert_eq!(verified.plaintext, plaintext);
        }
    }

    #[test]
    fn test_envelope_layout() {
        let (signer, _) = signer_and_verifier();
        let document = String::from_utf8(sign(&signer, b"a\n-b\n")).unwrap();

        let expected_head = format!(
            "{BEGIN_MESSAGE}\nHash: SHA256\nKey: {}\n\na\n- -b\n\n{BEGIN_SIGNATURE}\n",
            signer.key_id()
        );
        assert!(document.starts_with(&expected_head));
        assert!(document.ends_with(&format!("{END_SIGNATURE}\n")));
    }

    #[test]
    fn test_tampered_plaintext_fails() {
        let (signer, verifier) = signer_and_verifier();
        let document = String::from_utf8(sign(&signer, b"  foo.tgz: sha256:aaaa\n")).unwrap();
        let tampered = document.replace("sha256:aaaa", "sha256:bbbb");

        assert!(matches!(
            verifier.check_document(tampered.as_bytes()),
            Err(SignatureError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_unknown_key() {
        let (signer, _) = signer_and_verifier();
        let verifier = Ed25519Verifier::new(Keyring::new());

        match verifier.check_document(&sign(&signer, b"x\n")) {
            Err(SignatureError::UnknownKey(id)) => assert_eq!(id, signer.key_id()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_key_selector() {
        let (signer, _) = signer_and_verifier();
        let options = SignOptions {
            key: Some("FFFFFFFFFFFFFFFF".to_string()),
            ..SignOptions::default()
        };

        assert!(matches!(
            signer.clearsign(b"x\n", &options),
            Err(SignError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_key_selector_ignores_case() {
        let (signer, verifier) = signer_and_verifier();
        let options = SignOptions {
            key: Some(signer.key_id().to_ascii_lowercase()),
            ..SignOptions::default()
        };

        let document = signer.clearsign(b"x\n", &options).unwrap();
        assert!(verifier.check_document(&document).is_ok());
    }

    #[test]
    fn test_malformed_documents() {
        let (signer, verifier) = signer_and_verifier();
        let document = String::from_utf8(sign(&signer, b"x\n")).unwrap();

        let cases = [
            String::new(),
            "hello\n".to_string(),
            document.replace("Hash: SHA256", "Hash: MD5"),
            document.replace(&format!("{END_SIGNATURE}\n"), ""),
            document.replace(&format!("{BEGIN_SIGNATURE}\n"), ""),
            format!("{document}extra\n"),
            document.replace("\nx\n", "\n-x\n"),
        ];

        for case in cases {
            assert!(
                matches!(
                    verifier.check_document(case.as_bytes()),
                    Err(SignatureError::Malformed(_))
                ),
                "accepted: {case:?}"
            );
        }
    }

    #[test]
    fn test_truncated_signature_is_malformed() {
        let envelope = decode_envelope(&encode_envelope(b"x\n", "00", &[1u8; 64])).unwrap();
        assert_eq!(envelope.signature, [1u8; 64]);

        let document = String::from_utf8(encode_envelope(b"x\n", "00", &[1u8; 64])).unwrap();
        let truncated = document.replacen("0101", "", 1);
        assert!(matches!(
            decode_envelope(truncated.as_bytes()),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let (_, verifier) = signer_and_verifier();
        assert!(matches!(
            verifier.check_signature(Path::new("/nonexistent/pkgprov/foo.tgz.prov")),
            Err(SignatureError::Io { .. })
        ));
    }
}
