//! binforge: version reconciliation for prebuilt runtime and service binaries.
//!
//! # Usage
//!
//! ```text
//! binforge --family runtime check-versions --feed api_response.json
//! binforge --family runtime update-metadata --build-matrix-file plan.json --archive-checksums-file checksums.txt
//! binforge --family runtime cleanup-eol --eol-versions '["8.0"]'
//! binforge --family services create-archive --service redis --version 8.2.1 --os macos-aarch64 --timestamp 20250301120000
//! binforge --family services status [--json]
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use binforge_core::Family;
use commands::{
    check_versions::CheckVersionsArgs, cleanup_eol::CleanupEolArgs,
    create_archive::CreateArchiveArgs, status::StatusArgs, update_metadata::UpdateMetadataArgs,
    StageContext,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "binforge",
    version,
    about = "Decide what to rebuild, package archives and keep build metadata in sync",
    long_about = None,
)]
struct Cli {
    /// Subject family: runtime, installer or services.
    #[arg(long)]
    family: Family,

    /// Optional YAML file overriding platforms, hash fields and services.
    #[arg(long, env = "BINFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Metadata store path (defaults to the family's metadata file).
    #[arg(long)]
    metadata: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare a feed snapshot with the metadata and emit the build matrix.
    CheckVersions(CheckVersionsArgs),

    /// Record archive checksums for a build matrix in the metadata.
    UpdateMetadata(UpdateMetadataArgs),

    /// Remove end-of-life versions from the metadata.
    CleanupEol(CleanupEolArgs),

    /// Package build output into a timestamped, checksummed archive.
    CreateArchive(CreateArchiveArgs),

    /// Show the builds recorded in the metadata.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = StageContext::resolve(cli.family, cli.config.as_deref(), cli.metadata)?;
    match cli.command {
        Commands::CheckVersions(args) => args.run(&ctx),
        Commands::UpdateMetadata(args) => args.run(&ctx),
        Commands::CleanupEol(args) => args.run(&ctx),
        Commands::CreateArchive(args) => args.run(&ctx),
        Commands::Status(args) => args.run(&ctx),
    }
}

/// Log to stderr so stdout stays machine readable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
