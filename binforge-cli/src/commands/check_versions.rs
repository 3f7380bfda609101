//! `binforge check-versions`: diff stage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use binforge_reconcile::{
    feed::{load_feed, FeedFormat},
    pipeline::{self, OutputMode},
};

use super::StageContext;

const LOCAL_GITHUB_OUTPUT: &str = "github_output.txt";

/// Arguments for `binforge check-versions`.
#[derive(Args, Debug)]
pub struct CheckVersionsArgs {
    /// Feed snapshot downloaded by the workflow.
    #[arg(long)]
    pub feed: PathBuf,

    /// Snapshot format; defaults to the family's usual source.
    #[arg(long)]
    pub feed_format: Option<FeedFormat>,

    /// GitHub Actions output file to append `matrix=`, `eol=` and `should-build=` to.
    /// Without it the outputs replace `github_output.txt` in the working directory.
    #[arg(long, env = "GITHUB_OUTPUT")]
    pub github_output: Option<PathBuf>,

    /// Also write the build matrix as pretty JSON.
    #[arg(long)]
    pub plan_out: Option<PathBuf>,

    /// Also write the EOL list as JSON.
    #[arg(long)]
    pub eol_out: Option<PathBuf>,
}

impl CheckVersionsArgs {
    pub fn run(self, ctx: &StageContext) -> Result<()> {
        let format = self
            .feed_format
            .unwrap_or_else(|| FeedFormat::default_for(ctx.profile.family));
        let feed = load_feed(&self.feed, format, &ctx.profile)
            .with_context(|| format!("failed to read {format} feed"))?;

        let outcome = pipeline::check_versions(&ctx.profile, &ctx.metadata, &feed)
            .with_context(|| format!("version check failed for {}", ctx.metadata.display()))?;

        let (output, mode) = match &self.github_output {
            Some(path) => (path.clone(), OutputMode::Append),
            None => (PathBuf::from(LOCAL_GITHUB_OUTPUT), OutputMode::Truncate),
        };
        pipeline::write_github_output(&output, &outcome, mode)
            .with_context(|| format!("failed to write GitHub output to {}", output.display()))?;
        if let Some(path) = &self.plan_out {
            pipeline::write_json_file(path, &outcome.plan)?;
        }
        if let Some(path) = &self.eol_out {
            pipeline::write_json_file(path, &outcome.eol)?;
        }

        for entry in &outcome.plan.include {
            println!(
                "{} {} ({}) on {}",
                "build".green().bold(),
                entry.key,
                entry.version,
                entry.platform
            );
        }
        for key in &outcome.eol {
            println!("{} {key}", "eol".yellow().bold());
        }
        println!(
            "Build matrix: {} items | EOL versions: {} items | should-build={}",
            outcome.plan.len(),
            outcome.eol.len(),
            outcome.should_build()
        );
        Ok(())
    }
}
