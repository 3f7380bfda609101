//! `binforge create-archive`: package one build.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use binforge_archive::{create_archive, write_archive_info, ArchiveRequest};
use binforge_core::Platform;

use super::StageContext;

/// Arguments for `binforge create-archive`.
#[derive(Args, Debug)]
pub struct CreateArchiveArgs {
    /// Precise version being packaged.
    #[arg(long)]
    pub version: String,

    /// Target platform, e.g. `macos-aarch64`.
    #[arg(long)]
    pub os: String,

    /// Build timestamp, `YYYYMMDDHHMMSS`.
    #[arg(long)]
    pub timestamp: String,

    /// Service name (services family only).
    #[arg(long)]
    pub service: Option<String>,

    /// Directory holding the build output.
    #[arg(long, default_value = ".")]
    pub source_root: PathBuf,

    /// Directory for the archive and `archive_info.txt`.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

impl CreateArchiveArgs {
    pub fn run(self, ctx: &StageContext) -> Result<()> {
        let request = ArchiveRequest {
            version: self.version,
            platform: Platform(self.os),
            timestamp: self.timestamp,
            group: self.service,
            source_root: self.source_root,
            out_dir: self.out_dir,
        };
        let info = create_archive(&ctx.profile, &request).context("failed to create archive")?;
        write_archive_info(&request.out_dir, &info)?;

        println!("Created {}", info.filename);
        println!("SHA512: {}", info.sha512);
        if let Some(line) = &info.checksum_line {
            println!("Checksum line: {line}");
        }
        Ok(())
    }
}
