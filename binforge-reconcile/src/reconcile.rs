//! Reconcile stage: fold build results back into the metadata store.
//!
//! Two passes. The first validates every plan entry (derived key, platform,
//! freshness field, checksum) without touching the store; the second applies
//! all of them. A failure in the first pass leaves `store` exactly as it was.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use binforge_core::{
    BuildEntry, BuildPlan, BuildPlanEntry, ChecksumRecord, MetadataStore, SubjectKey,
    SubjectProfile,
};

use crate::checksum::{hash_warnings, ChecksumSet};
use crate::error::SyncError;

/// What a successful [`reconcile`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Keys that had no record before this run.
    pub created: Vec<SubjectKey>,
    /// Existing keys whose record was refreshed.
    pub updated: Vec<SubjectKey>,
    /// Number of build entries written (one per plan entry).
    pub builds_recorded: usize,
    pub last_sync: DateTime<Utc>,
}

/// Apply `plan` + `checksums` to `store`.
///
/// For every plan entry the record at its key is created or has the plan's
/// release fields overwritten, and `builds[platform]` is replaced by a fresh
/// entry stamped `now`. Other release fields and other platforms' builds are
/// left alone. `last_sync` is set to `now` even for an empty plan.
pub fn reconcile(
    profile: &SubjectProfile,
    store: &mut MetadataStore,
    plan: &BuildPlan,
    checksums: &ChecksumSet,
    now: DateTime<Utc>,
) -> Result<ReconcileSummary, SyncError> {
    let mut matched: Vec<(&BuildPlanEntry, &ChecksumRecord)> = Vec::with_capacity(plan.len());
    for entry in &plan.include {
        validate_entry(profile, entry)?;
        let platform = profile.checksum_has_platform.then_some(&entry.platform);
        let identifier = profile.checksum_identifier(entry.group.as_deref(), &entry.version);
        let record = checksums.get(&identifier, platform).ok_or_else(|| {
            SyncError::MissingChecksum {
                identifier: identifier.clone(),
                platform: platform.cloned(),
            }
        })?;
        matched.push((entry, record));
    }

    let used: BTreeSet<_> = matched
        .iter()
        .map(|(_, record)| (record.identifier.as_str(), record.platform.as_ref()))
        .collect();
    for (_, record) in checksums.iter() {
        if !used.contains(&(record.identifier.as_str(), record.platform.as_ref())) {
            tracing::warn!(
                "checksum for {} is not part of the build plan; ignored",
                record.identifier
            );
        }
    }

    let mut created = BTreeSet::new();
    let mut updated = BTreeSet::new();
    for (entry, checksum) in matched {
        for warning in hash_warnings(checksum) {
            tracing::warn!("{warning}");
        }

        if !store.records.contains_key(&entry.key) {
            created.insert(entry.key.clone());
        } else if !created.contains(&entry.key) {
            updated.insert(entry.key.clone());
        }
        let record = store.records.entry(entry.key.clone()).or_default();
        for (field, value) in &entry.release {
            record.release.insert(field.clone(), value.clone());
        }
        record.builds.insert(
            entry.platform.clone(),
            BuildEntry {
                filename: checksum.filename.clone(),
                hashes: checksum.hashes.clone(),
                last_build: Some(now),
            },
        );
        tracing::info!(
            "updated {} on {}: {}",
            entry.key,
            entry.platform,
            checksum.filename
        );
    }

    store.last_sync = Some(now);
    Ok(ReconcileSummary {
        created: created.into_iter().collect(),
        updated: updated.into_iter().collect(),
        builds_recorded: plan.len(),
        last_sync: now,
    })
}

fn validate_entry(profile: &SubjectProfile, entry: &BuildPlanEntry) -> Result<(), SyncError> {
    let incomplete = |reason: String| SyncError::IncompletePlanEntry {
        key: entry.key.clone(),
        reason,
    };

    let derived = profile.derive_key(entry.group.as_deref(), &entry.version)?;
    if derived != entry.key {
        return Err(incomplete(format!(
            "version '{}' derives to '{derived}'",
            entry.version
        )));
    }
    if profile.runner_for(&entry.platform).is_none() {
        return Err(incomplete(format!(
            "platform '{}' is not configured for {}",
            entry.platform, profile.family
        )));
    }
    match entry.release.get(&profile.freshness_field) {
        Some(value) if !value.is_null() => Ok(()),
        _ => Err(incomplete(format!(
            "release data lacks '{}'",
            profile.freshness_field
        ))),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
