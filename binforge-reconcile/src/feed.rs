//! Feed snapshot adapters.
//!
//! The CI workflow downloads upstream data before `check-versions` runs; this
//! module turns those snapshots into the normalized [`Feed`] the diff stage
//! consumes. Supported formats:
//!
//! - `normalized`: `{ "entries": [ { "version", "compare", ... } ] }`
//! - `php-watch`: the PHP.watch versions API response
//! - `services-report`: `[mariadb]` headers followed by `v11: 11.8.3 (...)`
//! - `services-json`: `{ "mariadb": { "11": "11.8.3" } }`

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;

use binforge_core::{Family, Feed, FeedEntry, FeedStatus, ReleaseMeta, SubjectProfile};

use crate::error::FeedError;

/// Release attributes every PHP.watch entry must carry; copied verbatim into
/// the version record.
pub const PHP_WATCH_FIELDS: &[&str] = &[
    "versionId",
    "releaseDate",
    "activeSupportEndDate",
    "eolDate",
    "isEOLVersion",
    "isSecureVersion",
    "isLatestVersion",
    "isFutureVersion",
    "isNextVersion",
];

/// Snapshot format accepted by [`load_feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Normalized,
    PhpWatch,
    ServicesReport,
    ServicesJson,
}

impl FeedFormat {
    /// The format each family's workflow produces by default.
    pub fn default_for(family: Family) -> Self {
        match family {
            Family::Runtime => FeedFormat::PhpWatch,
            Family::Installer => FeedFormat::Normalized,
            Family::Services => FeedFormat::ServicesReport,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedFormat::Normalized => "normalized",
            FeedFormat::PhpWatch => "php-watch",
            FeedFormat::ServicesReport => "services-report",
            FeedFormat::ServicesJson => "services-json",
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normalized" => Ok(FeedFormat::Normalized),
            "php-watch" => Ok(FeedFormat::PhpWatch),
            "services-report" => Ok(FeedFormat::ServicesReport),
            "services-json" => Ok(FeedFormat::ServicesJson),
            other => Err(format!(
                "unknown feed format '{other}'; expected: normalized, php-watch, services-report, services-json"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Read and normalize the feed snapshot at `path`.
pub fn load_feed(
    path: &Path,
    format: FeedFormat,
    profile: &SubjectProfile,
) -> Result<Feed, FeedError> {
    let contents = std::fs::read_to_string(path).map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let feed = parse_feed(&contents, format, profile, path)?;
    tracing::debug!(
        "read {} feed entries from {} ({format})",
        feed.entries.len(),
        path.display()
    );
    Ok(feed)
}

/// Normalize an in-memory snapshot. `path` is only used in error messages.
pub fn parse_feed(
    contents: &str,
    format: FeedFormat,
    profile: &SubjectProfile,
    path: &Path,
) -> Result<Feed, FeedError> {
    let json = || -> Result<Value, FeedError> {
        serde_json::from_str(contents).map_err(|source| FeedError::Parse {
            path: path.to_path_buf(),
            source,
        })
    };

    match format {
        FeedFormat::Normalized => serde_json::from_str(contents).map_err(|source| FeedError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        FeedFormat::PhpWatch => from_php_watch(json()?),
        FeedFormat::ServicesReport => {
            let reported = parse_services_report(contents)?;
            Ok(from_service_versions(profile, &reported))
        }
        FeedFormat::ServicesJson => {
            let reported = parse_services_json(json()?)?;
            Ok(from_service_versions(profile, &reported))
        }
    }
}

// ---------------------------------------------------------------------------
// PHP.watch
// ---------------------------------------------------------------------------

fn from_php_watch(document: Value) -> Result<Feed, FeedError> {
    let Some(Value::Object(data)) = document.get("data") else {
        return Err(FeedError::MissingField {
            entry: "<root>".to_string(),
            field: "data".to_string(),
        });
    };

    let mut entries = Vec::with_capacity(data.len());
    for (id, item) in data {
        let name = match item.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            Some(_) => {
                return Err(FeedError::InvalidField {
                    entry: id.clone(),
                    field: "name".to_string(),
                    reason: "expected a non-empty string".to_string(),
                })
            }
            None => {
                return Err(FeedError::MissingField {
                    entry: id.clone(),
                    field: "name".to_string(),
                })
            }
        };

        let mut release = ReleaseMeta::new();
        for field in PHP_WATCH_FIELDS {
            let value = item.get(*field).ok_or_else(|| FeedError::MissingField {
                entry: name.clone(),
                field: (*field).to_string(),
            })?;
            release.insert((*field).to_string(), value.clone());
        }

        let flag = |field: &str| -> Result<bool, FeedError> {
            release[field].as_bool().ok_or_else(|| FeedError::InvalidField {
                entry: name.clone(),
                field: field.to_string(),
                reason: "expected a boolean".to_string(),
            })
        };
        let status = if flag("isEOLVersion")? {
            FeedStatus::Eol
        } else if flag("isFutureVersion")? {
            FeedStatus::Future
        } else {
            FeedStatus::Current
        };

        let compare = release["releaseDate"]
            .as_str()
            .ok_or_else(|| FeedError::InvalidField {
                entry: name.clone(),
                field: "releaseDate".to_string(),
                reason: "expected a date string".to_string(),
            })?
            .to_string();

        entries.push(FeedEntry {
            group: None,
            version: name,
            compare,
            status,
            release,
        });
    }
    Ok(Feed { entries })
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Service name -> major -> full version, as reported upstream.
pub type ServiceVersions = BTreeMap<String, BTreeMap<String, String>>;

/// Parse the text report of the services version check script.
///
/// ```text
/// [mariadb]
///   v11: 11.8.3 (latest stable)
/// ```
///
/// Lines outside a `[service]` section, and lines that do not start with a
/// `v<major>:` marker, are ignored.
pub fn parse_services_report(report: &str) -> Result<ServiceVersions, FeedError> {
    let mut versions = ServiceVersions::new();
    let mut current: Option<String> = None;

    for (idx, raw) in report.lines().enumerate() {
        let line = raw.trim();
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim();
            if name.is_empty() {
                return Err(FeedError::Report {
                    line: idx + 1,
                    reason: "empty service header".to_string(),
                });
            }
            versions.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }
        let Some(service) = &current else {
            continue;
        };
        let Some((marker, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(major) = marker.trim().strip_prefix('v') else {
            continue;
        };
        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit() || c == '.') {
            continue;
        }
        let Some(full) = rest.split_whitespace().next() else {
            return Err(FeedError::Report {
                line: idx + 1,
                reason: format!("no version given for {service} v{major}"),
            });
        };
        versions
            .entry(service.clone())
            .or_default()
            .insert(major.to_string(), full.to_string());
    }
    Ok(versions)
}

fn parse_services_json(document: Value) -> Result<ServiceVersions, FeedError> {
    let Value::Object(services) = document else {
        return Err(FeedError::InvalidField {
            entry: "<root>".to_string(),
            field: "<root>".to_string(),
            reason: "expected an object of services".to_string(),
        });
    };
    let mut versions = ServiceVersions::new();
    for (service, majors) in services {
        let Value::Object(majors) = majors else {
            return Err(FeedError::InvalidField {
                entry: service,
                field: "<majors>".to_string(),
                reason: "expected an object of major versions".to_string(),
            });
        };
        let slot = versions.entry(service.clone()).or_default();
        for (major, full) in majors {
            match full {
                Value::String(full) if !full.trim().is_empty() => {
                    slot.insert(major, full.trim().to_string());
                }
                _ => {
                    return Err(FeedError::InvalidField {
                        entry: format!("{service} v{major}"),
                        field: "version".to_string(),
                        reason: "expected a non-empty string".to_string(),
                    })
                }
            }
        }
    }
    Ok(versions)
}

/// Build a feed covering every configured service/major pair.
///
/// Pairs missing from the upstream data are marked
/// [`FeedStatus::Unavailable`] so the diff stage neither builds nor retires
/// them.
pub fn from_service_versions(profile: &SubjectProfile, reported: &ServiceVersions) -> Feed {
    let mut entries = Vec::new();
    for (service, majors) in &profile.groups {
        let upstream = reported.get(service);
        if upstream.is_none() {
            tracing::warn!("no version data found for {service}");
        }
        for major in majors {
            match upstream.and_then(|m| m.get(major)) {
                Some(full) => {
                    let mut release = ReleaseMeta::new();
                    release.insert(profile.freshness_field.clone(), Value::String(full.clone()));
                    entries.push(FeedEntry {
                        group: Some(service.clone()),
                        version: full.clone(),
                        compare: full.clone(),
                        status: FeedStatus::Current,
                        release,
                    });
                }
                None => {
                    if upstream.is_some() {
                        tracing::warn!("no version found for {service} v{major}");
                    }
                    entries.push(FeedEntry {
                        group: Some(service.clone()),
                        version: major.clone(),
                        compare: String::new(),
                        status: FeedStatus::Unavailable,
                        release: ReleaseMeta::new(),
                    });
                }
            }
        }
    }

    for (service, majors) in reported {
        let configured = profile.groups.get(service);
        for major in majors.keys() {
            if !configured.is_some_and(|c| c.contains(major)) {
                tracing::debug!("ignoring unconfigured {service} v{major}");
            }
        }
    }
    Feed { entries }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn php_watch_item(name: &str, date: &str, eol: bool, future: bool) -> Value {
        json!({
            "name": name,
            "versionId": 1,
            "releaseDate": date,
            "activeSupportEndDate": "2026-12-31",
            "eolDate": "2027-12-31",
            "isEOLVersion": eol,
            "isSecureVersion": !eol,
            "isLatestVersion": false,
            "isFutureVersion": future,
            "isNextVersion": future
        })
    }

    #[test]
    fn php_watch_classifies_entries() {
        let doc = json!({
            "data": {
                "80": php_watch_item("8.0", "2020-11-26", true, false),
                "84": php_watch_item("8.4", "2024-11-21", false, false),
                "85": php_watch_item("8.5", "2025-11-20", false, true)
            }
        });
        let feed = from_php_watch(doc).expect("feed");
        let status: Vec<_> = feed.entries.iter().map(|e| (e.version.as_str(), e.status)).collect();
        assert_eq!(
            status,
            vec![
                ("8.0", FeedStatus::Eol),
                ("8.4", FeedStatus::Current),
                ("8.5", FeedStatus::Future)
            ]
        );
        let current = &feed.entries[1];
        assert_eq!(current.compare, "2024-11-21");
        assert_eq!(current.release.len(), PHP_WATCH_FIELDS.len());
    }

    #[test]
    fn php_watch_requires_every_release_field() {
        let mut item = php_watch_item("8.4", "2024-11-21", false, false);
        item.as_object_mut().expect("object").remove("eolDate");
        let err = from_php_watch(json!({ "data": { "84": item } })).unwrap_err();
        assert!(matches!(err, FeedError::MissingField { ref field, .. } if field == "eolDate"));
    }

    #[test]
    fn php_watch_rejects_non_boolean_flags() {
        let mut item = php_watch_item("8.4", "2024-11-21", false, false);
        item["isEOLVersion"] = json!("no");
        let err = from_php_watch(json!({ "data": { "84": item } })).unwrap_err();
        assert!(matches!(err, FeedError::InvalidField { .. }));
    }

    #[test]
    fn services_report_parses_sections() {
        let report = "Checking services...\n[mariadb]\n  v11: 11.8.3 (latest stable)\n  v10: 10.11.14\n\n[redis]\n  v8: 8.2.1 (latest stable)\n  version data from endoflife.date\n";
        let versions = parse_services_report(report).expect("report");
        assert_eq!(versions["mariadb"]["11"], "11.8.3");
        assert_eq!(versions["mariadb"]["10"], "10.11.14");
        assert_eq!(versions["redis"].len(), 1);
    }

    #[test]
    fn services_report_rejects_marker_without_version() {
        let err = parse_services_report("[redis]\n  v8:\n").unwrap_err();
        assert!(matches!(err, FeedError::Report { line: 2, .. }));
    }

    #[test]
    fn missing_service_pairs_become_unavailable() {
        let profile = SubjectProfile::builtin(Family::Services);
        let reported = parse_services_report("[redis]\n  v8: 8.2.1\n").expect("report");
        let feed = from_service_versions(&profile, &reported);

        let redis8 = feed
            .entries
            .iter()
            .find(|e| e.group.as_deref() == Some("redis") && e.version == "8.2.1")
            .expect("redis 8");
        assert_eq!(redis8.status, FeedStatus::Current);
        assert_eq!(redis8.release["version"], "8.2.1");

        let unavailable = feed
            .entries
            .iter()
            .filter(|e| e.status == FeedStatus::Unavailable)
            .count();
        // 3 mariadb + 2 mysql + 5 postgresql + redis 7
        assert_eq!(unavailable, 11);
    }

    #[test]
    fn services_json_matches_report() {
        let profile = SubjectProfile::builtin(Family::Services);
        let from_json = parse_feed(
            r#"{"mariadb": {"11": "11.8.3"}}"#,
            FeedFormat::ServicesJson,
            &profile,
            Path::new("services.json"),
        )
        .expect("json");
        let from_text = parse_feed(
            "[mariadb]\nv11: 11.8.3\n",
            FeedFormat::ServicesReport,
            &profile,
            Path::new("services.txt"),
        )
        .expect("text");
        assert_eq!(from_json, from_text);
    }

    #[test]
    fn feed_format_from_str() {
        assert_eq!("php-watch".parse::<FeedFormat>(), Ok(FeedFormat::PhpWatch));
        assert!("xml".parse::<FeedFormat>().is_err());
        assert_eq!(FeedFormat::default_for(Family::Services), FeedFormat::ServicesReport);
    }
}
