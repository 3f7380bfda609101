//! `binforge update-metadata`: reconcile stage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgGroup, Args};

use binforge_reconcile::{parse_checksums, pipeline};

use super::{inline_or_file, StageContext};

/// Arguments for `binforge update-metadata`.
#[derive(Args, Debug)]
#[command(
    group(ArgGroup::new("matrix").required(true).args(["build_matrix", "build_matrix_file"])),
    group(ArgGroup::new("checksums").required(true).args(["archive_checksums", "archive_checksums_file"])),
)]
pub struct UpdateMetadataArgs {
    /// Build matrix JSON as emitted by `check-versions`.
    #[arg(long)]
    pub build_matrix: Option<String>,

    /// File holding the build matrix JSON.
    #[arg(long)]
    pub build_matrix_file: Option<PathBuf>,

    /// Checksum lines (`version[,os],<hashes>,filename`) or JSON records.
    #[arg(long)]
    pub archive_checksums: Option<String>,

    /// File holding the checksum input.
    #[arg(long)]
    pub archive_checksums_file: Option<PathBuf>,
}

impl UpdateMetadataArgs {
    pub fn run(self, ctx: &StageContext) -> Result<()> {
        let matrix = inline_or_file(
            self.build_matrix,
            self.build_matrix_file.as_deref(),
            "build matrix",
        )?;
        let checksums = inline_or_file(
            self.archive_checksums,
            self.archive_checksums_file.as_deref(),
            "archive checksums",
        )?;

        let plan = pipeline::parse_plan(&matrix)?;
        let checksums = parse_checksums(&ctx.profile, &checksums)?;
        let summary =
            pipeline::update_metadata(&ctx.profile, &ctx.metadata, &plan, &checksums, Utc::now())
                .with_context(|| format!("failed to update {}", ctx.metadata.display()))?;

        println!(
            "Updated {}: {} builds recorded ({} new, {} refreshed)",
            ctx.metadata.display(),
            summary.builds_recorded,
            summary.created.len(),
            summary.updated.len()
        );
        Ok(())
    }
}
