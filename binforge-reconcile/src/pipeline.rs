//! File-based stage entrypoints used by the CLI.
//!
//! Each function is one process invocation's worth of work:
//! load -> compute -> (persist). Persisting happens only after the in-memory
//! stage succeeded, so a failed stage leaves the metadata file as it was.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use binforge_core::{store, BuildPlan, Feed, SubjectKey, SubjectProfile};

use crate::checksum::ChecksumSet;
use crate::diff::{reconcile_diff, DiffOutcome};
use crate::eol::remove_subjects;
use crate::error::{io_err, SyncError};
use crate::reconcile::{reconcile, ReconcileSummary};

/// Diff stage: compare `feed` with the store at `metadata`. Writes nothing.
pub fn check_versions(
    profile: &SubjectProfile,
    metadata: &Path,
    feed: &Feed,
) -> Result<DiffOutcome, SyncError> {
    let store = store::load_at(metadata, profile)?;
    let outcome = reconcile_diff(profile, feed, &store)?;
    tracing::info!("build matrix: {} items", outcome.plan.len());
    tracing::info!("EOL versions: {} items", outcome.eol.len());
    Ok(outcome)
}

/// Reconcile stage: fold `checksums` for `plan` into the store and persist it.
pub fn update_metadata(
    profile: &SubjectProfile,
    metadata: &Path,
    plan: &BuildPlan,
    checksums: &ChecksumSet,
    now: DateTime<Utc>,
) -> Result<ReconcileSummary, SyncError> {
    let mut store = store::load_at(metadata, profile)?;
    let summary = reconcile(profile, &mut store, plan, checksums, now)?;
    store::save_at(metadata, profile, &store)?;
    Ok(summary)
}

/// EOL cleanup: remove `eol` keys from the store and persist it.
pub fn cleanup_eol(
    profile: &SubjectProfile,
    metadata: &Path,
    eol: &[SubjectKey],
) -> Result<usize, SyncError> {
    let mut store = store::load_at(metadata, profile)?;
    let removed = remove_subjects(&mut store, eol);
    store::save_at(metadata, profile, &store)?;
    Ok(removed)
}

/// Parse a build matrix as emitted by the diff stage (`{"include": [...]}`).
pub fn parse_plan(input: &str) -> Result<BuildPlan, SyncError> {
    serde_json::from_str(input.trim()).map_err(|source| SyncError::Payload {
        what: "build matrix",
        source,
    })
}

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// How [`write_github_output`] treats an existing output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// `$GITHUB_OUTPUT` is shared by every step of a job.
    Append,
    /// Local fallback file; each run replaces the previous outputs.
    Truncate,
}

/// Write `matrix=`, `eol=` and `should-build=` to a GitHub Actions output
/// file.
pub fn write_github_output(
    path: &Path,
    outcome: &DiffOutcome,
    mode: OutputMode,
) -> Result<(), SyncError> {
    let matrix = serde_json::to_string(&outcome.plan)?;
    let eol = serde_json::to_string(&outcome.eol)?;

    let mut options = std::fs::OpenOptions::new();
    options.create(true);
    match mode {
        OutputMode::Append => options.append(true),
        OutputMode::Truncate => options.write(true).truncate(true),
    };
    let mut file = options.open(path).map_err(|e| io_err(path, e))?;
    let lines = format!(
        "matrix={matrix}\neol={eol}\nshould-build={}\n",
        outcome.should_build()
    );
    file.write_all(lines.as_bytes())
        .map_err(|e| io_err(path, e))?;
    tracing::debug!("wrote stage outputs to {} ({mode:?})", path.display());
    Ok(())
}

/// Write `value` as pretty JSON to `path` (plan and EOL files).
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), SyncError> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    std::fs::write(path, format!("{json}\n")).map_err(|e| io_err(path, e))?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}
