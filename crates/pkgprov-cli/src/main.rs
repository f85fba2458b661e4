use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use pkgprov_cli::commands::{
    exit_code,
    inspect::{cmd_digest, cmd_manifest},
    keygen::{cmd_keygen, KeygenArgs},
    sign::{cmd_sign, SignArgs},
    verify::{cmd_verify, VerifyArgs},
};
use pkgprov_cli::config::Config;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Sign packages and verify their provenance files.
#[derive(Parser, Debug)]
#[command(name = "pkgprov", author = "pkgprov Contributors", version)]
struct Cli {
    /// Configuration file (default: $PKGPROV_CONFIG, then ./pkgprov.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build, clearsign and write the provenance file for a package.
    Sign(SignArgs),
    /// Check a package against its provenance file.
    Verify(VerifyArgs),
    /// Print the canonical provenance manifest without signing it.
    Manifest {
        /// Path to the package archive
        package: PathBuf,
    },
    /// Print the SHA-256 digest of a file.
    Digest {
        /// Path to the file
        package: PathBuf,
    },
    /// Generate an Ed25519 key pair for the built-in backend.
    Keygen(KeygenArgs),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::discover(cli.config.as_deref())?;
    match cli.command {
        Commands::Sign(args) => cmd_sign(args, &config),
        Commands::Verify(args) => cmd_verify(args, &config),
        Commands::Manifest { package } => cmd_manifest(&package, &config),
        Commands::Digest { package } => cmd_digest(&package),
        Commands::Keygen(args) => cmd_keygen(args),
    }
}
