//! End-of-life cleanup.

use binforge_core::{MetadataStore, SubjectKey};

use crate::error::SyncError;

/// Delete every key in `eol` from `store`; unknown keys are skipped.
///
/// Returns the number of records actually removed, so a second call with the
/// same list returns 0.
pub fn remove_subjects(store: &mut MetadataStore, eol: &[SubjectKey]) -> usize {
    let mut removed = 0;
    for key in eol {
        if store.records.remove(key).is_some() {
            tracing::info!("removed EOL version: {key}");
            removed += 1;
        } else {
            tracing::debug!("{key} not in metadata; skipped");
        }
    }
    removed
}

/// Parse an EOL list as written by the diff stage: a JSON array of keys.
pub fn parse_eol_list(input: &str) -> Result<Vec<SubjectKey>, SyncError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|source| SyncError::Payload {
        what: "EOL list",
        source,
    })
}
