//! Configuration file loading.
//!
//! The file is looked up from `--config`, then `$PKGPROV_CONFIG`, then
//! `./pkgprov.toml`. Relative paths inside it resolve against the directory
//! holding the file. Command-line flags take precedence over every value here.

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PKGPROV_CONFIG";

/// Configuration file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pkgprov.toml";

/// Signing backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// GnuPG clearsign via the `gpg` executable.
    #[default]
    Gpg,
    /// Built-in Ed25519 clearsign envelope.
    Ed25519,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpgConfig {
    pub program: Option<PathBuf>,
    pub homedir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,
    /// Default signing key selector.
    pub key: Option<String>,
    /// Default verification keyring.
    pub keyring: Option<PathBuf>,
    /// Ed25519 key pair file.
    pub secret_key: Option<PathBuf>,
    /// Metadata document looked up inside packages.
    pub metadata_file: Option<String>,
    #[serde(default)]
    pub gpg: GpgConfig,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid configuration")
    }

    /// Load a configuration file, resolving relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        // Config failures exit 1: keep the io::Error out of the chain.
        let contents = fs::read_to_string(path)
            .map_err(|err| anyhow!("failed to read config file {}: {err}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("failed to load config file {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Find and load the configuration, or return defaults when none exists.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::load(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::load(local);
        }
        Ok(Self::default())
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            self.keyring.as_mut(),
            self.secret_key.as_mut(),
            self.gpg.homedir.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
