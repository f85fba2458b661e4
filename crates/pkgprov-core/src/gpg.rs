//! GnuPG backend producing and checking standard OpenPGP clearsigned documents.
//!
//! Signing runs `gpg --clearsign`; verification runs `gpg --decrypt` with
//! machine-readable status output on stderr and reads the recovered
//! plaintext from stdout.

use crate::signature::{
    PassphrasePolicy, SignError, SignOptions, SignatureError, SignatureVerifier, Signer,
    VerifiedDocument,
};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use tracing::{debug, warn};

/// Program name used when none is configured.
pub const DEFAULT_PROGRAM: &str = "gpg";

const STATUS_PREFIX: &str = "[GNUPG:] ";

/// Clearsigns through a local `gpg` installation.
#[derive(Debug, Clone)]
pub struct GpgSigner {
    program: PathBuf,
    homedir: Option<PathBuf>,
}

impl GpgSigner {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            homedir: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_homedir(mut self, homedir: impl Into<PathBuf>) -> Self {
        self.homedir = Some(homedir.into());
        self
    }
}

impl Default for GpgSigner {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for a clearsign run, after any `--homedir`.
fn sign_args(options: &SignOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    if let PassphrasePolicy::Batch { passphrase } = &options.passphrase {
        args.extend(["--batch", "--no-tty"].map(OsString::from));
        if passphrase.is_some() {
            // The passphrase is the first line on stdin, the plaintext follows.
            args.extend(
                ["--pinentry-mode", "loopback", "--passphrase-fd", "0"].map(OsString::from),
            );
        }
    }
    if let Some(key) = &options.key {
        args.push("--local-user".into());
        args.push(key.into());
    }
    args.extend(["--clearsign", "--armor", "--output", "-"].map(OsString::from));
    args
}

impl Signer for GpgSigner {
    fn clearsign(&self, plaintext: &[u8], options: &SignOptions) -> Result<Vec<u8>, SignError> {
        let mut command = Command::new(&self.program);
        if let Some(homedir) = &self.homedir {
            command.arg("--homedir").arg(homedir);
        }
        command.args(sign_args(options));

        // Interactive runs leave stderr on the terminal for pinentry.
        let interactive = options.passphrase == PassphrasePolicy::Interactive;
        command.stderr(if interactive {
            Stdio::inherit()
        } else {
            Stdio::piped()
        });

        let mut input = Vec::with_capacity(plaintext.len() + 64);
        if let PassphrasePolicy::Batch {
            passphrase: Some(passphrase),
        } = &options.passphrase
        {
            input.extend_from_slice(passphrase.as_bytes());
            input.push(b'\n');
        }
        input.extend_from_slice(plaintext);

        debug!(program = %self.program.display(), key = ?options.key, "running gpg clearsign");
        let (written, output) = run_with_input(command, &input).map_err(|source| {
            SignError::Spawn {
                program: self.program.display().to_string(),
                source,
            }
        })?;

        if !output.status.success() {
            return Err(SignError::Backend(failure_message(&output)));
        }
        written.map_err(|e| SignError::Backend(format!("failed to write to gpg: {e}")))?;
        if output.stdout.is_empty() {
            return Err(SignError::Backend("gpg produced no output".to_string()));
        }
        Ok(output.stdout)
    }
}

/// Checks clearsigned documents with `gpg --decrypt`.
#[derive(Debug, Clone)]
pub struct GpgVerifier {
    program: PathBuf,
    homedir: Option<PathBuf>,
    keyring: Option<PathBuf>,
}

impl GpgVerifier {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            homedir: None,
            keyring: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_homedir(mut self, homedir: impl Into<PathBuf>) -> Self {
        self.homedir = Some(homedir.into());
        self
    }

    /// Restrict verification to a single keyring file.
    ///
    /// gpg looks up a keyring name without a slash in its homedir, so a
    /// relative path is anchored at the current directory here.
    pub fn with_keyring(mut self, keyring: impl Into<PathBuf>) -> Self {
        let keyring = keyring.into();
        self.keyring = Some(if keyring.is_relative() {
            match env::current_dir() {
                Ok(cwd) => cwd.join(&keyring),
                Err(err) => {
                    warn!(
                        keyring = %keyring.display(),
                        error = %err,
                        "cannot resolve keyring path"
                    );
                    keyring
                }
            }
        } else {
            keyring
        });
        self
    }

    fn verify_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(homedir) = &self.homedir {
            args.push("--homedir".into());
            args.push(homedir.into());
        }
        args.extend(["--batch", "--no-tty", "--status-fd", "2"].map(OsString::from));
        if let Some(keyring) = &self.keyring {
            args.push("--no-default-keyring".into());
            args.push("--keyring".into());
            args.push(keyring.into());
        }
        args.extend(["--output", "-", "--decrypt"].map(OsString::from));
        args
    }
}

impl Default for GpgVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for GpgVerifier {
    fn check_signature(&self, signed_document: &Path) -> Result<VerifiedDocument, SignatureError> {
        let document = fs::read(signed_document).map_err(|source| SignatureError::Io {
            path: signed_document.to_path_buf(),
            source,
        })?;

        let mut command = Command::new(&self.program);
        command.args(self.verify_args()).stderr(Stdio::piped());

        debug!(
            program = %self.program.display(),
            document = %signed_document.display(),
            "running gpg verify"
        );
        let (written, output) = run_with_input(command, &document).map_err(|e| {
            SignatureError::Backend(format!(
                "failed to run {}: {e}",
                self.program.display()
            ))
        })?;

        let status = String::from_utf8_lossy(&output.stderr);
        let signer_key_id = interpret_status(&status, output.status.success())?;
        written.map_err(|e| SignatureError::Backend(format!("failed to write to gpg: {e}")))?;
        Ok(VerifiedDocument {
            signer_key_id,
            plaintext: output.stdout,
        })
    }
}

/// Reduce gpg status lines to a verdict.
///
/// `NO_PUBKEY` wins over the `ERRSIG` gpg emits alongside it; any other
/// failure keyword wins over `GOODSIG`.
pub(crate) fn interpret_status(status: &str, exited_ok: bool) -> Result<String, SignatureError> {
    let mut good: Option<String> = None;
    let mut failure: Option<SignatureError> = None;

    for line in status.lines() {
        let Some(rest) = line.strip_prefix(STATUS_PREFIX) else {
            continue;
        };
        let mut fields = rest.split_whitespace();
        let keyword = fields.next().unwrap_or_default();
        let key_id = fields.next().unwrap_or_default().to_string();

        match keyword {
            "GOODSIG" => good = Some(key_id),
            "NO_PUBKEY" => failure = Some(SignatureError::UnknownKey(key_id)),
            "BADSIG" | "EXPKEYSIG" | "REVKEYSIG" | "ERRSIG" => {
                if failure.is_none() {
                    failure = Some(SignatureError::BadSignature { key_id });
                }
            }
            "NODATA" => {
                if failure.is_none() {
                    failure = Some(SignatureError::Malformed(
                        "no signed data found".to_string(),
                    ));
                }
            }
            _ => {}
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    match good {
        Some(key_id) if exited_ok => Ok(key_id),
        Some(_) => Err(SignatureError::Backend(
            "gpg reported a good signature but exited with failure".to_string(),
        )),
        None => Err(SignatureError::Malformed(
            "no signature status reported".to_string(),
        )),
    }
}

/// Spawn `command` with piped stdin/stdout, feed it `input`, and collect output.
///
/// Input is written from a scoped thread so a child that produces output
/// before draining stdin cannot deadlock. The write result is returned
/// separately: a child that exits early closes the pipe, and its own exit
/// status is the more useful error.
fn run_with_input(mut command: Command, input: &[u8]) -> io::Result<(io::Result<()>, Output)> {
    command.stdin(Stdio::piped()).stdout(Stdio::piped());
    let mut child = command.spawn()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "child stdin unavailable"))?;

    thread::scope(|scope| {
        let writer = scope.spawn(move || stdin.write_all(input));
        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
        Ok((written, output))
    })
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("gpg exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use tempfile::TempDir;

    fn args(options: &SignOptions) -> Vec<String> {
        sign_args(options)
            .into_iter()
            .map(|arg| arg.into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_interactive_sign_args() {
        assert_eq!(
            args(&SignOptions::default()),
            ["--clearsign", "--armor", "--output", "-"]
        );
    }

    #[test]
    fn test_batch_sign_args_with_key() {
        let options = SignOptions {
            key: Some("ABCDEF0123456789".to_string()),
            passphrase: PassphrasePolicy::Batch { passphrase: None },
        };
        assert_eq!(
            args(&options),
            [
                "--batch",
                "--no-tty",
                "--local-user",
                "ABCDEF0123456789",
                "--clearsign",
                "--armor",
                "--output",
                "-"
            ]
        );
    }

    #[test]
    fn test_batch_sign_args_with_passphrase() {
        let options = SignOptions {
            key: None,
            passphrase: PassphrasePolicy::Batch {
                passphrase: Some("secret".to_string()),
            },
        };
        let rendered = args(&options);
        assert!(rendered
            .windows(2)
            .any(|w| w == ["--pinentry-mode", "loopback"]));
        assert!(rendered.windows(2).any(|w| w == ["--passphrase-fd", "0"]));
        assert!(!rendered.iter().any(|arg| arg.contains("secret")));
    }

    #[test]
    fn test_verify_args_with_keyring() {
        let verifier = GpgVerifier::new()
            .with_homedir("/tmp/gnupg")
            .with_keyring("/tmp/pubring.gpg");
        let rendered: Vec<String> = verifier
            .verify_args()
            .into_iter()
            .map(|arg| arg.into_string().unwrap())
            .collect();
        assert_eq!(
            rendered,
            [
                "--homedir",
                "/tmp/gnupg",
                "--batch",
                "--no-tty",
                "--status-fd",
                "2",
                "--no-default-keyring",
                "--keyring",
                "/tmp/pubring.gpg",
                "--output",
                "-",
                "--decrypt"
            ]
        );
    }

    #[test]
    fn test_relative_keyring_is_anchored_at_cwd() {
        let verifier = GpgVerifier::new().with_keyring("pubring.gpg");
        let expected = env::current_dir().unwrap().join("pubring.gpg");
        assert!(expected.is_absolute());
        assert!(verifier.verify_args().contains(&expected.into_os_string()));
    }

    #[test]
    fn test_status_good_signature() {
        let status = "\
[GNUPG:] NEWSIG
gpg: Signature made Mon 01 Jan 2024 00:00:00 UTC
[GNUPG:] KEY_CONSIDERED 0123456789ABCDEF0123456789ABCDEF01234567 0
[GNUPG:] SIG_ID abc 2024-01-01 1704067200
[GNUPG:] GOODSIG 89ABCDEF01234567 Package Signer <signer@example.com>
[GNUPG:] VALIDSIG 0123456789ABCDEF0123456789ABCDEF01234567 2024-01-01 1704067200
";
        assert_eq!(interpret_status(status, true).unwrap(), "89ABCDEF01234567");
    }

    #[test]
    fn test_status_unknown_key() {
        let status = "\
[GNUPG:] NEWSIG
[GNUPG:] ERRSIG 89ABCDEF01234567 1 10 01 1704067200 9 -
[GNUPG:] NO_PUBKEY 89ABCDEF01234567
[GNUPG:] FAILURE gpg-exit 33554433
";
        match interpret_status(status, false) {
            Err(SignatureError::UnknownKey(id)) => assert_eq!(id, "89ABCDEF01234567"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_status_bad_signature() {
        let status = "[GNUPG:] BADSIG 89ABCDEF01234567 Package Signer\n";
        assert!(matches!(
            interpret_status(status, false),
            Err(SignatureError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_status_expired_key_is_rejected() {
        let status = "[GNUPG:] EXPKEYSIG 89ABCDEF01234567 Package Signer\n";
        assert!(matches!(
            interpret_status(status, true),
            Err(SignatureError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_status_no_data() {
        let status = "[GNUPG:] NODATA 1\n[GNUPG:] NODATA 2\n";
        assert!(matches!(
            interpret_status(status, false),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn test_status_empty_fails_closed() {
        assert!(matches!(
            interpret_status("", true),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn test_status_good_but_failed_exit() {
        let status = "[GNUPG:] GOODSIG 89ABCDEF01234567 Package Signer\n";
        assert!(matches!(
            interpret_status(status, false),
            Err(SignatureError::Backend(_))
        ));
    }

    #[test]
    fn test_missing_program_is_reported() {
        let signer = GpgSigner::new().with_program("/nonexistent/pkgprov/gpg");
        assert!(matches!(
            signer.clearsign(b"x\n", &SignOptions::default()),
            Err(SignError::Spawn { .. })
        ));
    }

    #[test]
    fn test_verify_missing_document() {
        let verifier = GpgVerifier::new().with_program("/nonexistent/pkgprov/gpg");
        assert!(matches!(
            verifier.check_signature(Path::new("/nonexistent/pkgprov/foo.tgz.prov")),
            Err(SignatureError::Io { .. })
        ));
    }

    /// Write an executable shell script standing in for gpg.
    #[cfg(unix)]
    fn fake_gpg(dir: &TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("gpg");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn batch(passphrase: Option<&str>) -> SignOptions {
        SignOptions {
            key: None,
            passphrase: PassphrasePolicy::Batch {
                passphrase: passphrase.map(str::to_string),
            },
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_passphrase_precedes_plaintext_on_stdin() {
        let dir = TempDir::new().unwrap();
        let signer = GpgSigner::new().with_program(fake_gpg(&dir, "cat"));

        let signed = signer
            .clearsign(b"name: foo\n", &batch(Some("hunter2")))
            .unwrap();
        assert_eq!(signed, b"hunter2\nname: foo\n");

        let signed = signer.clearsign(b"name: foo\n", &batch(None)).unwrap();
        assert_eq!(signed, b"name: foo\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_sign_failure_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let script = "cat >/dev/null\necho 'gpg: signing failed: No secret key' >&2\nexit 2";
        let signer = GpgSigner::new().with_program(fake_gpg(&dir, script));

        match signer.clearsign(b"name: foo\n", &batch(None)) {
            Err(SignError::Backend(message)) => {
                assert_eq!(message, "gpg: signing failed: No secret key");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_sign_write_error_after_clean_exit() {
        let dir = TempDir::new().unwrap();
        let signer = GpgSigner::new().with_program(fake_gpg(&dir, "exit 0"));

        // Larger than a pipe buffer, so the write fails once the script exits.
        let plaintext = vec![b'a'; 1 << 20];
        match signer.clearsign(&plaintext, &batch(None)) {
            Err(SignError::Backend(message)) => {
                assert!(message.starts_with("failed to write to gpg"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_takes_plaintext_from_stdout() {
        let dir = TempDir::new().unwrap();
        let script = "cat >/dev/null\n\
            printf 'name: foo\\n'\n\
            echo '[GNUPG:] GOODSIG 89ABCDEF01234567 Package Signer' >&2";
        let verifier = GpgVerifier::new().with_program(fake_gpg(&dir, script));
        let document = dir.path().join("foo-0.1.0.tgz.prov");
        fs::write(&document, b"-----BEGIN PGP SIGNED MESSAGE-----\n").unwrap();

        let verified = verifier.check_signature(&document).unwrap();
        assert_eq!(verified.signer_key_id, "89ABCDEF01234567");
        assert_eq!(verified.plaintext, b"name: foo\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_unknown_key_from_status() {
        let dir = TempDir::new().unwrap();
        let script = "cat >/dev/null\necho '[GNUPG:] NO_PUBKEY 89ABCDEF01234567' >&2\nexit 2";
        let verifier = GpgVerifier::new().with_program(fake_gpg(&dir, script));
        let document = dir.path().join("foo-0.1.0.tgz.prov");
        fs::write(&document, b"signed\n").unwrap();

        assert!(matches!(
            verifier.check_signature(&document),
            Err(SignatureError::UnknownKey(id)) if id == "89ABCDEF01234567"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_write_error_after_good_status() {
        let dir = TempDir::new().unwrap();
        let script = "echo '[GNUPG:] GOODSIG 89ABCDEF01234567 Package Signer' >&2\nexit 0";
        let verifier = GpgVerifier::new().with_program(fake_gpg(&dir, script));
        let document = dir.path().join("foo-0.1.0.tgz.prov");
        fs::write(&document, vec![b'a'; 1 << 20]).unwrap();

        match verifier.check_signature(&document) {
            Err(SignatureError::Backend(message)) => {
                assert!(message.starts_with("failed to write to gpg"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
