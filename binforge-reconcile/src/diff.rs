//! Diff stage: feed + metadata -> build plan + end-of-life list.
//!
//! Pure: neither input is mutated, and identical inputs give identical
//! output. Plan order is feed order x platform order.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use binforge_core::{
    BuildPlan, BuildPlanEntry, Feed, FeedStatus, MetadataStore, SubjectKey, SubjectProfile,
};

use crate::error::{FeedError, SyncError};

/// Output of [`reconcile_diff`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiffOutcome {
    pub plan: BuildPlan,
    /// Stored keys that are end-of-life, in key order.
    pub eol: Vec<SubjectKey>,
}

impl DiffOutcome {
    pub fn should_build(&self) -> bool {
        !self.plan.is_empty()
    }
}

/// Compare `feed` against `store` and decide what to build and what to retire.
///
/// - A `current` entry is built when its derived key is not stored yet, or
///   when the profile's freshness rule says the stored record is stale.
/// - A stored key is end-of-life when no `current`, `future` or
///   `unavailable` feed entry derives to it.
pub fn reconcile_diff(
    profile: &SubjectProfile,
    feed: &Feed,
    store: &MetadataStore,
) -> Result<DiffOutcome, SyncError> {
    let mut live: BTreeSet<SubjectKey> = BTreeSet::new();
    let mut buildable: BTreeMap<SubjectKey, &str> = BTreeMap::new();
    let mut plan = BuildPlan::default();

    for entry in &feed.entries {
        let key = profile.derive_key(entry.group.as_deref(), &entry.version)?;
        match entry.status {
            FeedStatus::Eol => {
                tracing::debug!("skipping end-of-life {}", entry.version);
                continue;
            }
            FeedStatus::Future | FeedStatus::Unavailable => {
                tracing::debug!("skipping {:?} {}", entry.status, entry.version);
                live.insert(key);
                continue;
            }
            FeedStatus::Current => {}
        }

        if let Some(first) = buildable.insert(key.clone(), &entry.version) {
            return Err(SyncError::DuplicateFeedKey {
                key,
                first: first.to_string(),
                second: entry.version.clone(),
            });
        }
        live.insert(key.clone());

        if entry.compare.trim().is_empty() {
            return Err(FeedError::MissingField {
                entry: entry.version.clone(),
                field: "compare".to_string(),
            }
            .into());
        }

        let need_build = match store.records.get(&key) {
            None => {
                tracing::info!("new version detected: {key} -> {}", entry.version);
                true
            }
            Some(record) => {
                let stored = record.release_str(&profile.freshness_field);
                let stale = profile.freshness.is_stale(&entry.compare, stored);
                if stale {
                    tracing::info!(
                        "updated version detected: {key} -> {} (was: {stored})",
                        entry.compare
                    );
                } else {
                    tracing::debug!("{key} is up to date ({stored})");
                }
                stale
            }
        };
        if !need_build {
            continue;
        }

        let mut release = entry.release.clone();
        release
            .entry(profile.freshness_field.clone())
            .or_insert_with(|| Value::String(entry.compare.clone()));

        for target in &profile.platforms {
            plan.include.push(BuildPlanEntry {
                key: key.clone(),
                version: entry.version.clone(),
                group: entry.group.clone(),
                platform: target.name.clone(),
                runs_on: target.runner.clone(),
                release: release.clone(),
            });
        }
    }

    let eol: Vec<SubjectKey> = store
        .records
        .keys()
        .filter(|key| !live.contains(*key))
        .cloned()
        .collect();
    for key in &eol {
        tracing::info!("EOL version detected: {key}");
    }

    Ok(DiffOutcome { plan, eol })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use binforge_core::profile::PlatformTarget;
    use binforge_core::{Family, FeedEntry, Platform, ReleaseMeta, VersionRecord};
    use serde_json::json;

    fn entry(version: &str, compare: &str, status: FeedStatus) -> FeedEntry {
        FeedEntry {
            group: None,
            version: version.to_string(),
            compare: compare.to_string(),
            status,
            release: ReleaseMeta::new(),
        }
    }

    fn stored(field: &str, value: &str) -> VersionRecord {
        let mut record = VersionRecord::default();
        record.release.insert(field.to_string(), json!(value));
        record
    }

    #[test]
    fn new_subject_gets_one_entry_per_platform() {
        let mut profile = SubjectProfile::builtin(Family::Runtime);
        profile.platforms.push(PlatformTarget {
            name: Platform::from("linux-x86_64"),
            runner: "ubuntu-latest".to_string(),
        });
        let feed = Feed {
            entries: vec![entry("9.0", "2025-01-01", FeedStatus::Current)],
        };
        let store = MetadataStore::default();

        let outcome = reconcile_diff(&profile, &feed, &store).expect("diff");
        assert_eq!(outcome.plan.len(), 2);
        assert!(outcome.plan.include.iter().all(|e| e.key.0 == "9.0"));
        assert_eq!(outcome.plan.include[0].runs_on, "macos-latest");
        assert_eq!(outcome.plan.include[1].runs_on, "ubuntu-latest");
        assert_eq!(outcome.plan.include[0].release["releaseDate"], "2025-01-01");
        assert!(outcome.eol.is_empty());
        assert_eq!(store, MetadataStore::default());
    }

    #[test]
    fn staleness_follows_release_date() {
        let profile = SubjectProfile::builtin(Family::Runtime);
        let mut store = MetadataStore::default();
        store
            .records
            .insert(SubjectKey::from("8.4"), stored("releaseDate", "2024-01-01"));

        let newer = Feed {
            entries: vec![entry("8.4", "2024-06-01", FeedStatus::Current)],
        };
        assert_eq!(reconcile_diff(&profile, &newer, &store).expect("diff").plan.len(), 1);

        let same = Feed {
            entries: vec![entry("8.4", "2024-01-01", FeedStatus::Current)],
        };
        let outcome = reconcile_diff(&profile, &same, &store).expect("diff");
        assert!(outcome.plan.is_empty());
        assert!(!outcome.should_build());
    }

    #[test]
    fn installer_keys_use_minor_version() {
        let profile = SubjectProfile::builtin(Family::Installer);
        let mut store = MetadataStore::default();
        store
            .records
            .insert(SubjectKey::from("8.4"), stored("latest", "8.4.12"));
        let feed = Feed {
            entries: vec![entry("8.4.13", "8.4.13", FeedStatus::Current)],
        };
        let outcome = reconcile_diff(&profile, &feed, &store).expect("diff");
        assert_eq!(outcome.plan.len(), 1);
        assert_eq!(outcome.plan.include[0].key.0, "8.4");
        assert_eq!(outcome.plan.include[0].version, "8.4.13");
        assert_eq!(outcome.plan.include[0].release["latest"], "8.4.13");
    }

    #[test]
    fn eol_covers_flagged_and_vanished_keys() {
        let profile = SubjectProfile::builtin(Family::Runtime);
        let mut store = MetadataStore::default();
        for key in ["8.0", "8.1", "8.4", "8.5"] {
            store
                .records
                .insert(SubjectKey::from(key), stored("releaseDate", "2024-01-01"));
        }
        let feed = Feed {
            entries: vec![
                entry("8.0", "2020-11-26", FeedStatus::Eol),
                entry("8.4", "2024-01-01", FeedStatus::Current),
                entry("8.5", "2025-11-20", FeedStatus::Future),
            ],
        };
        let outcome = reconcile_diff(&profile, &feed, &store).expect("diff");
        let eol: Vec<&str> = outcome.eol.iter().map(|k| k.0.as_str()).collect();
        assert_eq!(eol, vec!["8.0", "8.1"]);
    }

    #[test]
    fn unavailable_entries_protect_stored_keys() {
        let profile = SubjectProfile::builtin(Family::Services);
        let mut store = MetadataStore::default();
        store
            .records
            .insert(SubjectKey::from("redis/7"), stored("version", "7.4.5"));
        let mut missing = entry("7", "", FeedStatus::Unavailable);
        missing.group = Some("redis".to_string());

        let outcome = reconcile_diff(&profile, &Feed { entries: vec![missing] }, &store)
            .expect("diff");
        assert!(outcome.plan.is_empty());
        assert!(outcome.eol.is_empty());
    }

    #[test]
    fn duplicate_buildable_keys_are_fatal() {
        let profile = SubjectProfile::builtin(Family::Installer);
        let feed = Feed {
            entries: vec![
                entry("8.4.12", "8.4.12", FeedStatus::Current),
                entry("8.4.13", "8.4.13", FeedStatus::Current),
            ],
        };
        let err = reconcile_diff(&profile, &feed, &MetadataStore::default()).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateFeedKey { .. }), "got: {err}");
    }

    #[test]
    fn current_entry_without_compare_value_is_fatal() {
        let profile = SubjectProfile::builtin(Family::Runtime);
        let feed = Feed {
            entries: vec![entry("8.4", " ", FeedStatus::Current)],
        };
        let err = reconcile_diff(&profile, &feed, &MetadataStore::default()).unwrap_err();
        assert!(matches!(err, SyncError::Feed(FeedError::MissingField { .. })));
    }
}
