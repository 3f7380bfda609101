//! Subcommand implementations.

pub mod check_versions;
pub mod cleanup_eol;
pub mod create_archive;
pub mod status;
pub mod update_metadata;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use binforge_core::{Config, Family, SubjectProfile};

/// Profile and metadata location shared by every subcommand.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub profile: SubjectProfile,
    pub metadata: PathBuf,
}

impl StageContext {
    pub fn resolve(
        family: Family,
        config: Option<&Path>,
        metadata: Option<PathBuf>,
    ) -> Result<Self> {
        let config = match config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        let profile = config
            .profile(family)
            .with_context(|| format!("invalid configuration for {family}"))?;
        let metadata = metadata.unwrap_or_else(|| PathBuf::from(&profile.metadata_file));
        tracing::debug!(
            "{family}: {} layout, {} platform(s), metadata {}",
            profile.layout.as_str(),
            profile.platforms.len(),
            metadata.display()
        );
        Ok(Self { profile, metadata })
    }
}

/// Inline value or the contents of a file, whichever was given.
pub(crate) fn inline_or_file(
    inline: Option<String>,
    file: Option<&Path>,
    what: &str,
) -> Result<String> {
    match (inline, file) {
        (Some(value), _) => Ok(value),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {what} from {}", path.display())),
        (None, None) => anyhow::bail!("missing {what}"),
    }
}
