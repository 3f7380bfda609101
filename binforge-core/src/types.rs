//! Domain types for binforge metadata, feeds, build plans and checksums.
//!
//! The in-memory model is layout independent: [`crate::store`] converts it to
//! and from the on-disk JSON shape of each subject family.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Derived metadata lookup key, e.g. `8.4` or `mariadb/11`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectKey(pub String);

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SubjectKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubjectKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A build target identifier such as `macos-aarch64`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Platform(pub String);

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque release attributes copied from the feed (release date, EOL flags,
/// numeric ids, full version...). Only the profile's freshness field is
/// interpreted.
pub type ReleaseMeta = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Metadata store
// ---------------------------------------------------------------------------

/// One platform's build artifact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEntry {
    pub filename: String,
    /// Hash field name -> hex digest (`sha512`, `cli_sha512`, ...).
    #[serde(flatten)]
    pub hashes: BTreeMap<String, String>,
    /// `None` for flat records written before build times were tracked.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::clock::iso")]
    pub last_build: Option<DateTime<Utc>>,
}

/// Last known state of one tracked subject.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(flatten)]
    pub release: ReleaseMeta,
    #[serde(default)]
    pub builds: BTreeMap<Platform, BuildEntry>,
}

impl VersionRecord {
    /// Stored value of `field` as a string, or `""` when absent or not a string.
    pub fn release_str(&self, field: &str) -> &str {
        self.release
            .get(field)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

/// Whole persisted state of one subject family.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataStore {
    /// Time of the last successful reconciliation; `None` when never synced.
    pub last_sync: Option<DateTime<Utc>>,
    pub records: BTreeMap<SubjectKey, VersionRecord>,
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Upstream classification of a feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    #[default]
    Current,
    /// No longer supported upstream.
    Eol,
    /// Announced but not released yet.
    Future,
    /// Tracked, but upstream data could not be obtained for this run.
    Unavailable,
}

/// One subject in the normalized feed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Service name for grouped families.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Precise version, e.g. `8.4.13`, `8.4` or `11.8.3`.
    pub version: String,
    /// Value compared against the stored freshness field.
    pub compare: String,
    #[serde(default)]
    pub status: FeedStatus,
    #[serde(default)]
    pub release: ReleaseMeta,
}

/// Normalized snapshot of upstream versions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub entries: Vec<FeedEntry>,
}

// ---------------------------------------------------------------------------
// Build plan and checksums
// ---------------------------------------------------------------------------

/// One unit of required build work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPlanEntry {
    pub key: SubjectKey,
    /// Precise version the artifact is built from; checksum lookup key.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(rename = "os")]
    pub platform: Platform,
    #[serde(rename = "runs-on")]
    pub runs_on: String,
    /// Release attributes used to seed or refresh the version record.
    #[serde(default)]
    pub release: ReleaseMeta,
}

/// The build matrix, serialized in the `{"include": [...]}` shape CI expects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default)]
    pub include: Vec<BuildPlanEntry>,
}

impl BuildPlan {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    pub fn len(&self) -> usize {
        self.include.len()
    }
}

/// Archive stage output for one plan entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub filename: String,
    #[serde(flatten)]
    pub hashes: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn newtype_display() {
        assert_eq!(SubjectKey::from("8.4").to_string(), "8.4");
        assert_eq!(Platform::from("macos-aarch64").to_string(), "macos-aarch64");
    }

    #[test]
    fn build_entry_flattens_hash_fields() {
        let entry: BuildEntry = serde_json::from_value(json!({
            "filename": "php-8.4-20250101000000-macos-aarch64.tar.gz",
            "cli_sha512": "aa",
            "fpm_sha512": "bb",
            "last_build": "2025-01-01T00:00:00Z"
        }))
        .expect("deserialize");
        assert_eq!(entry.hashes.len(), 2);
        assert_eq!(entry.hashes["cli_sha512"], "aa");

        let back = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(back["fpm_sha512"], "bb");
        assert!(back.get("hashes").is_none());
        assert_eq!(back["last_build"], "2025-01-01T00:00:00.000000Z");
    }

    #[test]
    fn build_entry_without_last_build_stays_without() {
        let entry: BuildEntry =
            serde_json::from_value(json!({"filename": "f.tar.gz", "sha512": "aa"}))
                .expect("deserialize");
        assert!(entry.last_build.is_none());
        assert_eq!(entry.hashes.len(), 1);

        let back = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(back, json!({"filename": "f.tar.gz", "sha512": "aa"}));
    }

    #[test]
    fn version_record_keeps_unknown_release_fields() {
        let record: VersionRecord = serde_json::from_value(json!({
            "releaseDate": "2024-11-21",
            "versionId": 84,
            "builds": {}
        }))
        .expect("deserialize");
        assert_eq!(record.release_str("releaseDate"), "2024-11-21");
        assert_eq!(record.release["versionId"], 84);
        assert_eq!(record.release_str("missing"), "");
        assert!(record.builds.is_empty());
    }

    #[test]
    fn feed_status_defaults_to_current() {
        let entry: FeedEntry =
            serde_json::from_value(json!({"version": "9.0", "compare": "2025-01-01"}))
                .expect("deserialize");
        assert_eq!(entry.status, FeedStatus::Current);
        assert!(entry.group.is_none());
    }

    #[test]
    fn plan_entry_uses_matrix_field_names() {
        let entry = BuildPlanEntry {
            key: SubjectKey::from("8.4"),
            version: "8.4".to_string(),
            group: None,
            platform: Platform::from("macos-aarch64"),
            runs_on: "macos-latest".to_string(),
            release: ReleaseMeta::new(),
        };
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["os"], "macos-aarch64");
        assert_eq!(value["runs-on"], "macos-latest");
        assert!(value.get("group").is_none());
    }
}
