//! Subject profiles: the configuration that turns the generic reconciliation
//! engine into the runtime, installer or services pipeline.
//!
//! # Config file
//!
//! ```yaml
//! runtime:
//!   platforms:
//!     - name: macos-aarch64
//!       runner: macos-latest
//!   hash_fields: [cli_sha512, fpm_sha512]
//! services:
//!   groups:
//!     redis: ["7", "8"]
//! ```
//!
//! Every section and every field is optional; absent values keep the
//! built-in defaults of [`SubjectProfile::builtin`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Platform, SubjectKey};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The tracked subject family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Runtime minor versions with per-platform builds.
    Runtime,
    /// Single-binary installer variant keyed by minor version.
    Installer,
    /// Auxiliary services keyed by service name and major version.
    Services,
}

impl Family {
    pub fn all() -> &'static [Family] {
        &[Family::Runtime, Family::Installer, Family::Services]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Family::Runtime => "runtime",
            Family::Installer => "installer",
            Family::Services => "services",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "runtime" => Ok(Family::Runtime),
            "installer" => Ok(Family::Installer),
            "services" => Ok(Family::Services),
            other => Err(format!(
                "unknown family '{other}'; expected: runtime, installer, services"
            )),
        }
    }
}

/// How a precise version maps onto the metadata lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// The version itself.
    Exact,
    /// First two dot-separated components: `8.4.13` -> `8.4`.
    MajorMinor,
    /// First component: `11.8.3` -> `11`.
    Major,
}

/// When a stored record counts as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessRule {
    /// Feed value sorts strictly after the stored one (ISO dates).
    Newer,
    /// Feed value differs from the stored one (version strings).
    Differs,
}

impl FreshnessRule {
    /// `true` when `feed` means the stored record must be rebuilt.
    pub fn is_stale(self, feed: &str, stored: &str) -> bool {
        match self {
            FreshnessRule::Newer => feed > stored,
            FreshnessRule::Differs => feed != stored,
        }
    }
}

/// On-disk JSON shape of a family's metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLayout {
    /// `{ last_sync, versions: { key: { ...release, builds: { platform: entry } } } }`
    MultiBuild,
    /// `{ last_sync, key: { ...release, filename, <hashes>, last_build } }`
    Flat,
    /// `{ last_sync, group: { major: { ...release, filename, <hashes>, last_build } } }`
    Grouped,
}

impl StoreLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreLayout::MultiBuild => "multi-build",
            StoreLayout::Flat => "flat",
            StoreLayout::Grouped => "grouped",
        }
    }

    /// Whether a record can hold builds for more than one platform.
    pub fn supports_multiple_platforms(self) -> bool {
        matches!(self, StoreLayout::MultiBuild)
    }
}

// ---------------------------------------------------------------------------
// Profile structs
// ---------------------------------------------------------------------------

/// A build target and the CI runner label that builds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformTarget {
    pub name: Platform,
    pub runner: String,
}

/// One member of a packaged archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMember {
    /// Path relative to the source root; `{group}` expands to the service name.
    pub source: String,
    /// Name inside the archive; `.` packs a directory's contents at the root.
    pub name: String,
}

/// Full configuration of one reconciliation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub family: Family,
    pub key_scheme: KeyScheme,
    /// Release attribute compared against the feed's `compare` value.
    pub freshness_field: String,
    pub freshness: FreshnessRule,
    pub platforms: Vec<PlatformTarget>,
    /// Hash fields every checksum record and build entry carries.
    pub hash_fields: Vec<String>,
    pub layout: StoreLayout,
    /// Whether checksum lines carry a platform column.
    pub checksum_has_platform: bool,
    /// Group name -> supported major versions. Empty for ungrouped families.
    pub groups: BTreeMap<String, Vec<String>>,
    /// Archive file name prefix; `{group}` expands to the service name.
    pub archive_prefix: String,
    pub archive_members: Vec<ArchiveMember>,
    /// Default metadata file name.
    pub metadata_file: String,
}

impl SubjectProfile {
    /// Built-in defaults for `family`.
    pub fn builtin(family: Family) -> Self {
        let platforms = vec![PlatformTarget {
            name: Platform::from("macos-aarch64"),
            runner: "macos-latest".to_string(),
        }];
        match family {
            Family::Runtime => Self {
                family,
                key_scheme: KeyScheme::MajorMinor,
                freshness_field: "releaseDate".to_string(),
                freshness: FreshnessRule::Newer,
                platforms,
                hash_fields: vec!["sha512".to_string()],
                layout: StoreLayout::MultiBuild,
                checksum_has_platform: true,
                groups: BTreeMap::new(),
                archive_prefix: "php".to_string(),
                archive_members: vec![
                    ArchiveMember {
                        source: "buildroot/bin/php".to_string(),
                        name: "php-cli".to_string(),
                    },
                    ArchiveMember {
                        source: "buildroot/bin/php-fpm".to_string(),
                        name: "php-fpm".to_string(),
                    },
                ],
                metadata_file: "metadata.json".to_string(),
            },
            Family::Installer => Self {
                family,
                key_scheme: KeyScheme::MajorMinor,
                freshness_field: "latest".to_string(),
                freshness: FreshnessRule::Differs,
                platforms,
                hash_fields: vec!["sha256".to_string()],
                layout: StoreLayout::Flat,
                checksum_has_platform: false,
                groups: BTreeMap::new(),
                archive_prefix: "php-installer".to_string(),
                archive_members: vec![ArchiveMember {
                    source: "buildroot/bin/php".to_string(),
                    name: "php".to_string(),
                }],
                metadata_file: "metadata-installer.json".to_string(),
            },
            Family::Services => Self {
                family,
                key_scheme: KeyScheme::Major,
                freshness_field: "version".to_string(),
                freshness: FreshnessRule::Differs,
                platforms,
                hash_fields: vec!["sha512".to_string()],
                layout: StoreLayout::Grouped,
                checksum_has_platform: true,
                groups: default_service_groups(),
                archive_prefix: "{group}".to_string(),
                archive_members: vec![ArchiveMember {
                    source: "{group}-package".to_string(),
                    name: ".".to_string(),
                }],
                metadata_file: "metadata-services.json".to_string(),
            },
        }
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            family: self.family.to_string(),
            reason,
        };

        if self.platforms.is_empty() {
            return Err(invalid("at least one platform is required".to_string()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for target in &self.platforms {
            if target.name.0.trim().is_empty() || target.runner.trim().is_empty() {
                return Err(invalid("platform name and runner must be non-empty".to_string()));
            }
            if !seen.insert(&target.name) {
                return Err(invalid(format!("platform '{}' listed twice", target.name)));
            }
        }
        if !self.layout.supports_multiple_platforms() && self.platforms.len() > 1 {
            return Err(invalid(format!(
                "the {} layout stores one build per record; configure exactly one platform",
                self.layout.as_str()
            )));
        }
        if self.hash_fields.is_empty() {
            return Err(invalid("at least one hash field is required".to_string()));
        }
        for field in &self.hash_fields {
            if field.is_empty()
                || field.contains(',')
                || RESERVED_BUILD_FIELDS.contains(&field.as_str())
            {
                return Err(invalid(format!("'{field}' cannot be used as a hash field")));
            }
        }
        if self.freshness_field.is_empty() {
            return Err(invalid("freshness field must be non-empty".to_string()));
        }
        match self.layout {
            StoreLayout::Grouped if self.groups.is_empty() => {
                return Err(invalid("grouped layout needs at least one group".to_string()));
            }
            StoreLayout::Grouped => {
                for name in self.groups.keys() {
                    if name.is_empty() || name.contains('/') || name == LAST_SYNC_FIELD {
                        return Err(invalid(format!("'{name}' cannot be used as a group name")));
                    }
                }
            }
            _ if !self.groups.is_empty() => {
                return Err(invalid(format!(
                    "groups are only meaningful for the grouped layout, not {}",
                    self.layout.as_str()
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// Derive the metadata lookup key for a precise version.
    ///
    /// Grouped profiles require `group` and prefix it: `mariadb/11`.
    pub fn derive_key(&self, group: Option<&str>, version: &str) -> Result<SubjectKey, ConfigError> {
        let key_err = |reason: &str| ConfigError::KeyDerivation {
            version: version.to_string(),
            reason: reason.to_string(),
        };

        let version = version.trim();
        if version.is_empty() {
            return Err(key_err("version is empty"));
        }
        let components: Vec<&str> = version.split('.').collect();
        if components.iter().any(|c| c.is_empty()) {
            return Err(key_err("version has an empty dot-separated component"));
        }
        let coarse = match self.key_scheme {
            KeyScheme::Exact => version.to_string(),
            KeyScheme::MajorMinor => components
                .iter()
                .take(2)
                .copied()
                .collect::<Vec<_>>()
                .join("."),
            KeyScheme::Major => components[0].to_string(),
        };

        match (self.layout, group) {
            (StoreLayout::Grouped, Some(group)) if !group.trim().is_empty() => {
                Ok(SubjectKey(format!("{}/{coarse}", group.trim())))
            }
            (StoreLayout::Grouped, _) => Err(key_err("grouped subjects need a group name")),
            (_, Some(group)) => Err(key_err(&format!(
                "group '{group}' given for an ungrouped family"
            ))),
            (_, None) => Ok(SubjectKey(coarse)),
        }
    }

    /// Runner label configured for `platform`.
    pub fn runner_for(&self, platform: &Platform) -> Option<&str> {
        self.platforms
            .iter()
            .find(|t| &t.name == platform)
            .map(|t| t.runner.as_str())
    }

    /// Number of comma-separated fields in one checksum line.
    pub fn checksum_field_count(&self) -> usize {
        1 + usize::from(self.checksum_has_platform) + self.hash_fields.len() + 1
    }

    /// Identifier a checksum record carries for a precise version.
    ///
    /// Grouped profiles qualify it with the group (`mariadb/11.8.3`) since two
    /// services can publish the same version in one run.
    pub fn checksum_identifier(&self, group: Option<&str>, version: &str) -> String {
        match (self.layout, group) {
            (StoreLayout::Grouped, Some(group)) => format!("{}/{}", group.trim(), version.trim()),
            _ => version.trim().to_string(),
        }
    }

    /// Human-readable checksum line format, e.g. `version,os,sha512,filename`.
    pub fn checksum_format(&self) -> String {
        let identifier = match self.layout {
            StoreLayout::Grouped => "service/version",
            _ => "version",
        };
        let mut fields = vec![identifier.to_string()];
        if self.checksum_has_platform {
            fields.push("os".to_string());
        }
        fields.extend(self.hash_fields.iter().cloned());
        fields.push("filename".to_string());
        fields.join(",")
    }
}

/// Top-level key holding the last reconciliation time in every layout.
pub const LAST_SYNC_FIELD: &str = "last_sync";

/// Build entry members that are not hashes.
pub const RESERVED_BUILD_FIELDS: &[&str] = &["filename", "last_build", "builds", LAST_SYNC_FIELD];

fn default_service_groups() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 4] = [
        ("mariadb", &["10", "11", "12"]),
        ("mysql", &["8", "9"]),
        ("postgresql", &["14", "15", "16", "17", "18"]),
        ("redis", &["7", "8"]),
    ];
    table
        .into_iter()
        .map(|(name, majors)| {
            (
                name.to_string(),
                majors.iter().map(|m| (*m).to_string()).collect(),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Per-family overrides read from the YAML config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverrides {
    #[serde(default)]
    pub platforms: Option<Vec<PlatformTarget>>,
    #[serde(default)]
    pub hash_fields: Option<Vec<String>>,
    #[serde(default)]
    pub groups: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub archive_prefix: Option<String>,
    #[serde(default)]
    pub archive_members: Option<Vec<ArchiveMember>>,
}

/// Root of the optional YAML config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub runtime: Option<ProfileOverrides>,
    #[serde(default)]
    pub installer: Option<ProfileOverrides>,
    #[serde(default)]
    pub services: Option<ProfileOverrides>,
}

impl Config {
    /// Load the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(path),
            source,
        })
    }

    fn overrides(&self, family: Family) -> Option<&ProfileOverrides> {
        match family {
            Family::Runtime => self.runtime.as_ref(),
            Family::Installer => self.installer.as_ref(),
            Family::Services => self.services.as_ref(),
        }
    }

    /// Built-in profile for `family` with this config's overrides applied and
    /// validated.
    pub fn profile(&self, family: Family) -> Result<SubjectProfile, ConfigError> {
        let mut profile = SubjectProfile::builtin(family);
        if let Some(o) = self.overrides(family) {
            if let Some(platforms) = &o.platforms {
                profile.platforms = platforms.clone();
            }
            if let Some(hash_fields) = &o.hash_fields {
                profile.hash_fields = hash_fields.clone();
            }
            if let Some(groups) = &o.groups {
                profile.groups = groups.clone();
            }
            if let Some(prefix) = &o.archive_prefix {
                profile.archive_prefix = prefix.clone();
            }
            if let Some(members) = &o.archive_members {
                profile.archive_members = members.clone();
            }
        }
        profile.validate()?;
        Ok(profile)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
