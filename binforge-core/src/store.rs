//! Metadata store persistence.
//!
//! One JSON document per subject family. The document is always rewritten
//! whole: `load_at` -> mutate in memory -> `save_at`.
//!
//! # Layouts
//!
//! ```text
//! multi-build  { "last_sync": "...", "versions": { "8.4": { ...release, "builds": { "macos-aarch64": {..} } } } }
//! flat         { "last_sync": "...", "8.4": { "latest": "8.4.13", ..., "filename", "sha256", "last_build"? } }
//! grouped      { "last_sync": "...", "mariadb": { "11": { "version": "11.8.3", "filename", "sha512", "last_build" } } }
//! ```
//!
//! Saves write `<file>.tmp` in the same directory and rename it over the
//! target, so a crash never leaves a truncated store behind.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock;
use crate::error::{io_err, StoreError};
use crate::profile::{StoreLayout, SubjectProfile, LAST_SYNC_FIELD};
use crate::types::{BuildEntry, MetadataStore, SubjectKey, VersionRecord};

#[derive(Debug, Serialize, Deserialize)]
struct MultiBuildDocument {
    #[serde(default, with = "clock::last_sync")]
    last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    versions: BTreeMap<SubjectKey, VersionRecord>,
}

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// Load the store at `path`.
///
/// Returns an empty, default-shaped store if the file does not exist yet.
pub fn load_at(path: &Path, profile: &SubjectProfile) -> Result<MetadataStore, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("no metadata at {}; starting empty", path.display());
            return Ok(MetadataStore::default());
        }
        Err(err) => return Err(io_err(path, err)),
    };
    let document: Value = serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    decode(profile, document, path)
}

/// Convert a parsed document into the in-memory model.
pub fn decode(
    profile: &SubjectProfile,
    document: Value,
    path: &Path,
) -> Result<MetadataStore, StoreError> {
    let layout = profile.layout;
    let shape = |reason: String| StoreError::Shape {
        path: path.to_path_buf(),
        layout: layout.as_str(),
        reason,
    };

    match layout {
        StoreLayout::MultiBuild => {
            let doc: MultiBuildDocument =
                serde_json::from_value(document).map_err(|e| shape(e.to_string()))?;
            Ok(MetadataStore {
                last_sync: doc.last_sync,
                records: doc.versions,
            })
        }
        StoreLayout::Flat => {
            let Value::Object(members) = document else {
                return Err(shape("top level must be an object".to_string()));
            };
            let mut store = MetadataStore::default();
            for (name, value) in members {
                if name == LAST_SYNC_FIELD {
                    store.last_sync = parse_last_sync(value).map_err(shape)?;
                    continue;
                }
                let record = record_from_flat(profile, &name, value).map_err(shape)?;
                store.records.insert(SubjectKey(name), record);
            }
            Ok(store)
        }
        StoreLayout::Grouped => {
            let Value::Object(members) = document else {
                return Err(shape("top level must be an object".to_string()));
            };
            let mut store = MetadataStore::default();
            for (group, value) in members {
                if group == LAST_SYNC_FIELD {
                    store.last_sync = parse_last_sync(value).map_err(shape)?;
                    continue;
                }
                let Value::Object(majors) = value else {
                    return Err(shape(format!("group '{group}' must be an object")));
                };
                for (major, value) in majors {
                    let key = format!("{group}/{major}");
                    let record = record_from_flat(profile, &key, value).map_err(shape)?;
                    store.records.insert(SubjectKey(key), record);
                }
            }
            Ok(store)
        }
    }
}

fn parse_last_sync(value: Value) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| format!("invalid last_sync '{text}': {e}")),
        other => Err(format!("last_sync must be a string, got {other}")),
    }
}

/// Split a flat record object into release attributes and its single build.
fn record_from_flat(
    profile: &SubjectProfile,
    key: &str,
    value: Value,
) -> Result<VersionRecord, String> {
    let Value::Object(mut members) = value else {
        return Err(format!("record '{key}' must be an object"));
    };

    let filename = members.remove("filename");
    let last_build = members.remove("last_build");
    let mut hashes = BTreeMap::new();
    for field in &profile.hash_fields {
        if let Some(hash) = members.remove(field) {
            let Value::String(hash) = hash else {
                return Err(format!("record '{key}': {field} must be a string"));
            };
            hashes.insert(field.clone(), hash);
        }
    }

    let mut record = VersionRecord {
        release: members,
        builds: BTreeMap::new(),
    };

    let Some(filename) = filename else {
        if !hashes.is_empty() {
            return Err(format!("record '{key}' has hashes but no filename"));
        }
        return Ok(record);
    };
    let Value::String(filename) = filename else {
        return Err(format!("record '{key}': filename must be a string"));
    };
    for field in &profile.hash_fields {
        if !hashes.contains_key(field) {
            return Err(format!("record '{key}' is missing hash field '{field}'"));
        }
    }
    let last_build = match last_build {
        Some(Value::String(text)) => Some(
            DateTime::parse_from_rfc3339(text.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| format!("record '{key}': invalid last_build '{text}': {e}"))?,
        ),
        Some(other) => return Err(format!("record '{key}': last_build must be a string, got {other}")),
        None => {
            tracing::debug!("record '{key}' has no last_build");
            None
        }
    };

    let Some(platform) = profile.platforms.first() else {
        return Err(format!(
            "record '{key}' has a build but the {} family has no platforms configured",
            profile.family
        ));
    };
    let platform = platform.name.clone();
    record.builds.insert(
        platform,
        BuildEntry {
            filename,
            hashes,
            last_build,
        },
    );
    Ok(record)
}

// ---------------------------------------------------------------------------
// 2. Save (atomic)
// ---------------------------------------------------------------------------

/// Convert the in-memory model into the profile's on-disk document.
pub fn encode(profile: &SubjectProfile, store: &MetadataStore) -> Result<Value, StoreError> {
    match profile.layout {
        StoreLayout::MultiBuild => {
            let doc = MultiBuildDocument {
                last_sync: store.last_sync,
                versions: store.records.clone(),
            };
            Ok(serde_json::to_value(doc)?)
        }
        StoreLayout::Flat => {
            let mut root = Map::new();
            root.insert(LAST_SYNC_FIELD.to_string(), last_sync_value(store.last_sync));
            for (key, record) in &store.records {
                root.insert(key.0.clone(), record_to_flat(profile, key, record)?);
            }
            Ok(Value::Object(root))
        }
        StoreLayout::Grouped => {
            let mut groups: BTreeMap<String, Map<String, Value>> = profile
                .groups
                .keys()
                .map(|g| (g.clone(), Map::new()))
                .collect();
            for (key, record) in &store.records {
                let Some((group, major)) = key.0.split_once('/') else {
                    return Err(StoreError::Unrepresentable {
                        key: key.0.clone(),
                        layout: profile.layout.as_str(),
                        reason: "grouped keys look like '<group>/<major>'".to_string(),
                    });
                };
                groups
                    .entry(group.to_string())
                    .or_default()
                    .insert(major.to_string(), record_to_flat(profile, key, record)?);
            }

            let mut root = Map::new();
            root.insert(LAST_SYNC_FIELD.to_string(), last_sync_value(store.last_sync));
            for (group, majors) in groups {
                root.insert(group, Value::Object(majors));
            }
            Ok(Value::Object(root))
        }
    }
}

fn last_sync_value(last_sync: Option<DateTime<Utc>>) -> Value {
    Value::String(last_sync.map(clock::to_iso).unwrap_or_default())
}

fn record_to_flat(
    profile: &SubjectProfile,
    key: &SubjectKey,
    record: &VersionRecord,
) -> Result<Value, StoreError> {
    let unrepresentable = |reason: String| StoreError::Unrepresentable {
        key: key.0.clone(),
        layout: profile.layout.as_str(),
        reason,
    };

    if record.builds.len() > 1 {
        return Err(unrepresentable(format!(
            "{} builds recorded, the layout holds one",
            record.builds.len()
        )));
    }

    let mut members = record.release.clone();
    if let Some((platform, build)) = record.builds.iter().next() {
        if profile.runner_for(platform).is_none() {
            return Err(unrepresentable(format!(
                "build for unconfigured platform '{platform}'"
            )));
        }
        members.insert("filename".to_string(), Value::String(build.filename.clone()));
        for (field, hash) in &build.hashes {
            members.insert(field.clone(), Value::String(hash.clone()));
        }
        if let Some(last_build) = build.last_build {
            members.insert("last_build".to_string(), Value::String(clock::to_iso(last_build)));
        }
    }
    Ok(Value::Object(members))
}

/// Atomically save `store` to `path`.
///
/// Writes to `<path>.tmp` then renames to `<path>`; a failed rename removes
/// the temp file and leaves the previous store untouched.
pub fn save_at(
    path: &Path,
    profile: &SubjectProfile,
    store: &MetadataStore,
) -> Result<(), StoreError> {
    let document = encode(profile, store)?;
    let json = serde_json::to_string_pretty(&document)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let tmp = tmp_path(path);
    std::fs::write(&tmp, format!("{json}\n")).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    tracing::info!(
        "wrote {} ({} records)",
        path.display(),
        store.records.len()
    );
    Ok(())
}

/// Sibling temp file used by [`save_at`].
pub fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "metadata.json".to_string());
    path.with_file_name(format!("{name}.tmp"))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
