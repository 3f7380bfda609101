//! Checksum input parsing and hash sanity checks.
//!
//! Accepts either a JSON array of records (or a single record object):
//!
//! ```json
//! [{ "identifier": "8.4", "platform": "macos-aarch64", "sha512": "...", "filename": "..." }]
//! ```
//!
//! or comma-separated lines, one per archive, in the profile's field order
//! (`version,os,sha512,filename` for the runtime family). Grouped families
//! qualify the identifier with the service: `mariadb/11.8.3`.

use std::collections::BTreeMap;

use binforge_core::{ChecksumRecord, Platform, StoreLayout, SubjectProfile};

use crate::error::SyncError;

/// Lookup key of a checksum record: precise identifier + optional platform.
pub type ChecksumKey = (String, Option<Platform>);

/// Parsed checksum input, consumed by the reconcile stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChecksumSet {
    records: BTreeMap<ChecksumKey, ChecksumRecord>,
}

impl ChecksumSet {
    pub fn get(&self, identifier: &str, platform: Option<&Platform>) -> Option<&ChecksumRecord> {
        self.records
            .get(&(identifier.to_string(), platform.cloned()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChecksumKey, &ChecksumRecord)> {
        self.records.iter()
    }

    fn insert(&mut self, location: String, record: ChecksumRecord) -> Result<(), SyncError> {
        let key = (record.identifier.clone(), record.platform.clone());
        match self.records.get(&key) {
            Some(existing) if existing == &record => {
                tracing::debug!("duplicate checksum for {} ignored", record.identifier);
                Ok(())
            }
            Some(_) => Err(SyncError::MalformedChecksum {
                location,
                reason: format!(
                    "conflicting checksum for {}{}",
                    record.identifier,
                    record
                        .platform
                        .as_ref()
                        .map(|p| format!(" on {p}"))
                        .unwrap_or_default()
                ),
            }),
            None => {
                self.records.insert(key, record);
                Ok(())
            }
        }
    }
}

fn check_identifier(profile: &SubjectProfile, identifier: &str) -> Result<(), String> {
    if profile.layout != StoreLayout::Grouped {
        return Ok(());
    }
    match identifier.split_once('/') {
        Some((group, version)) if !version.trim().is_empty() => {
            if profile.groups.contains_key(group.trim()) {
                Ok(())
            } else {
                Err(format!("unknown service '{group}' in '{identifier}'"))
            }
        }
        _ => Err(format!(
            "identifier '{identifier}' must look like '<service>/<version>'"
        )),
    }
}

/// Parse checksum input in either supported format.
pub fn parse_checksums(profile: &SubjectProfile, input: &str) -> Result<ChecksumSet, SyncError> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        parse_json(profile, trimmed)
    } else {
        parse_lines(profile, input)
    }
}

fn parse_lines(profile: &SubjectProfile, input: &str) -> Result<ChecksumSet, SyncError> {
    let expected = profile.checksum_field_count();
    let mut set = ChecksumSet::default();

    for (idx, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let location = format!("line {}", idx + 1);
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != expected {
            return Err(SyncError::MalformedChecksum {
                location,
                reason: format!(
                    "expected {expected} fields ({}), got {}",
                    profile.checksum_format(),
                    fields.len()
                ),
            });
        }
        if let Some(pos) = fields.iter().position(|f| f.is_empty()) {
            return Err(SyncError::MalformedChecksum {
                location,
                reason: format!("field {} is empty", pos + 1),
            });
        }

        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default().to_string();
        let identifier = next();
        check_identifier(profile, &identifier).map_err(|reason| SyncError::MalformedChecksum {
            location: location.clone(),
            reason,
        })?;
        let platform = profile.checksum_has_platform.then(|| Platform(next()));
        let hashes = profile
            .hash_fields
            .iter()
            .map(|field| (field.clone(), next()))
            .collect();
        let filename = next();

        set.insert(
            location,
            ChecksumRecord {
                identifier,
                platform,
                filename,
                hashes,
            },
        )?;
    }
    Ok(set)
}

fn parse_json(profile: &SubjectProfile, input: &str) -> Result<ChecksumSet, SyncError> {
    let malformed = |location: String, reason: String| SyncError::MalformedChecksum { location, reason };

    let parsed: Result<Vec<ChecksumRecord>, serde_json::Error> = if input.starts_with('[') {
        serde_json::from_str(input)
    } else {
        serde_json::from_str(input).map(|record| vec![record])
    };
    let records = parsed.map_err(|e| malformed("JSON input".to_string(), e.to_string()))?;

    let mut set = ChecksumSet::default();
    for (idx, record) in records.into_iter().enumerate() {
        let location = format!("record {}", idx + 1);
        if record.identifier.trim().is_empty() || record.filename.trim().is_empty() {
            return Err(malformed(location, "identifier and filename must be non-empty".to_string()));
        }
        if let Err(reason) = check_identifier(profile, &record.identifier) {
            return Err(malformed(location, reason));
        }
        match (&record.platform, profile.checksum_has_platform) {
            (None, true) => return Err(malformed(location, "missing platform".to_string())),
            (Some(p), false) => {
                return Err(malformed(location, format!("unexpected platform '{p}'")))
            }
            _ => {}
        }
        for field in &profile.hash_fields {
            match record.hashes.get(field) {
                Some(hash) if !hash.trim().is_empty() => {}
                _ => return Err(malformed(location, format!("missing hash field '{field}'"))),
            }
        }
        if let Some(extra) = record
            .hashes
            .keys()
            .find(|k| !profile.hash_fields.contains(k))
        {
            return Err(malformed(location, format!("unexpected field '{extra}'")));
        }
        set.insert(location, record)?;
    }
    Ok(set)
}

/// Sanity problems with the hash values of `record`, one message each.
///
/// Values must be hex; fields named `*sha256` / `*sha512` must also have the
/// digest's length. Callers log these; they are never fatal.
pub fn hash_warnings(record: &ChecksumRecord) -> Vec<String> {
    let mut warnings = Vec::new();
    for (field, value) in &record.hashes {
        if hex::decode(value).is_err() {
            warnings.push(format!(
                "{} {field} is not a hex digest: '{value}'",
                record.identifier
            ));
            continue;
        }
        let expected = if field.ends_with("sha512") {
            Some(128)
        } else if field.ends_with("sha256") {
            Some(64)
        } else {
            None
        };
        if let Some(expected) = expected.filter(|n| *n != value.len()) {
            warnings.push(format!(
                "{} {field} has {} hex digits, expected {expected}",
                record.identifier,
                value.len()
            ));
        }
    }
    warnings
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
