#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use pkgprov_core::{Ed25519Signer, Ed25519Verifier, KeyPair, Keyring};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Builder, Header};

pub const CHART_YAML: &[u8] = b"apiVersion: v2\nname: foo\nversion: 0.1.0\n";

/// Write a gzip-compressed tar package with the given members.
pub fn write_package(dir: &Path, file_name: &str, members: &[(&str, &[u8])]) -> PathBuf {
    let mut builder = Builder::new(Vec::new());
    for (path, data) in members {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    let bytes = encoder.finish().unwrap();

    let path = dir.join(file_name);
    fs::write(&path, bytes).unwrap();
    path
}

/// `foo-0.1.0.tgz` with a top-level Chart.yaml and a nested subchart.
pub fn write_chart(dir: &Path) -> PathBuf {
    write_package(
        dir,
        "foo-0.1.0.tgz",
        &[
            ("foo/Chart.yaml", CHART_YAML),
            ("foo/values.yaml", b"replicaCount: 1\n"),
            ("foo/templates/deployment.yaml", b"kind: Deployment\n"),
            ("foo/charts/bar/Chart.yaml", b"name: bar\nversion: 9.9.9\n"),
        ],
    )
}

pub fn ed25519_backend(seed: u8) -> (Ed25519Signer, Ed25519Verifier) {
    let pair = KeyPair::from_secret_bytes(&[seed; 32]);
    let mut keyring = Keyring::new();
    keyring.insert(pair.verifying_key());
    (Ed25519Signer::new(pair), Ed25519Verifier::new(keyring))
}

pub fn flip_byte(path: &Path, offset: usize) {
    let mut bytes = fs::read(path).unwrap();
    bytes[offset] ^= 0x01;
    fs::write(path, bytes).unwrap();
}
