//! `binforge cleanup-eol`: remove end-of-life records.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};

use binforge_reconcile::{parse_eol_list, pipeline};

use super::{inline_or_file, StageContext};

/// Arguments for `binforge cleanup-eol`.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("eol").required(true).args(["eol_versions", "eol_file"])))]
pub struct CleanupEolArgs {
    /// JSON array of keys, e.g. `["8.0", "8.1"]`.
    #[arg(long)]
    pub eol_versions: Option<String>,

    /// File holding the JSON array.
    #[arg(long)]
    pub eol_file: Option<PathBuf>,
}

impl CleanupEolArgs {
    pub fn run(self, ctx: &StageContext) -> Result<()> {
        let input = inline_or_file(self.eol_versions, self.eol_file.as_deref(), "EOL list")?;
        let eol = parse_eol_list(&input)?;
        let removed = pipeline::cleanup_eol(&ctx.profile, &ctx.metadata, &eol)
            .with_context(|| format!("failed to clean up {}", ctx.metadata.display()))?;
        println!("Removed {removed} EOL versions from {}", ctx.metadata.display());
        Ok(())
    }
}
