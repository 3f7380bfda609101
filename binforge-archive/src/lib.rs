//! # binforge-archive
//!
//! Packages build output into `<prefix>-<version>-<timestamp>-<os>.tar.gz`
//! and computes the content hashes the reconcile stage records.
//!
//! The build timestamp is supplied by the caller (the CI workflow generates it
//! once per build) and is part of the file name, so re-running a build never
//! overwrites an archive that was already published.

pub mod error;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use flate2::{write::GzEncoder, Compression};
use sha2::{Digest, Sha256, Sha512};

use binforge_core::{clock::BUILD_TIMESTAMP_FORMAT, Platform, SubjectProfile};

pub use error::ArchiveError;
use error::io_err;

/// Name of the key=value file the workflow reads after packaging.
pub const ARCHIVE_INFO_FILE: &str = "archive_info.txt";

const GROUP_PLACEHOLDER: &str = "{group}";

/// Inputs of one `create-archive` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// Precise version being packaged, e.g. `8.4.13` or `11.8.3`.
    pub version: String,
    pub platform: Platform,
    /// `YYYYMMDDHHMMSS`.
    pub timestamp: String,
    /// Service name for grouped families.
    pub group: Option<String>,
    /// Directory the archive member paths are relative to.
    pub source_root: PathBuf,
    pub out_dir: PathBuf,
}

/// Result of a successful [`create_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub filename: String,
    pub path: PathBuf,
    pub sha512: String,
    pub sha256: String,
    /// Line for `update-metadata --archive-checksums`, when every hash field
    /// of the profile is a whole-archive digest.
    pub checksum_line: Option<String>,
}

/// Check that `timestamp` is a real `YYYYMMDDHHMMSS` instant.
pub fn validate_timestamp(timestamp: &str) -> Result<(), ArchiveError> {
    let invalid = |reason: &str| ArchiveError::InvalidTimestamp {
        timestamp: timestamp.to_string(),
        reason: reason.to_string(),
    };
    if timestamp.is_empty() {
        return Err(invalid("timestamp is required"));
    }
    if timestamp.len() != 14 || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected 14 digits (YYYYMMDDHHMMSS)"));
    }
    NaiveDateTime::parse_from_str(timestamp, BUILD_TIMESTAMP_FORMAT)
        .map(|_| ())
        .map_err(|e| invalid(&e.to_string()))
}

/// Archive file name for `request` under `profile`.
pub fn archive_filename(
    profile: &SubjectProfile,
    request: &ArchiveRequest,
) -> Result<String, ArchiveError> {
    validate_timestamp(&request.timestamp)?;
    if request.version.trim().is_empty() {
        return Err(ArchiveError::EmptyVersion);
    }
    let group = resolve_group(profile, request.group.as_deref())?;
    let prefix = expand(&profile.archive_prefix, group);
    Ok(format!(
        "{prefix}-{}-{}-{}.tar.gz",
        request.version.trim(),
        request.timestamp,
        request.platform
    ))
}

fn resolve_group<'a>(
    profile: &SubjectProfile,
    group: Option<&'a str>,
) -> Result<Option<&'a str>, ArchiveError> {
    match (profile.groups.is_empty(), group) {
        (true, None) => Ok(None),
        (true, Some(group)) => Err(ArchiveError::InvalidGroup {
            reason: format!("the {} family has no services, got '{group}'", profile.family),
        }),
        (false, None) => Err(ArchiveError::InvalidGroup {
            reason: format!("the {} family needs a service name", profile.family),
        }),
        (false, Some(group)) if profile.groups.contains_key(group) => Ok(Some(group)),
        (false, Some(group)) => Err(ArchiveError::InvalidGroup {
            reason: format!(
                "unknown service '{group}'; expected one of: {}",
                profile.groups.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }),
    }
}

fn expand(template: &str, group: Option<&str>) -> String {
    match group {
        Some(group) => template.replace(GROUP_PLACEHOLDER, group),
        None => template.to_string(),
    }
}

/// Pack the profile's archive members for `request` and hash the result.
pub fn create_archive(
    profile: &SubjectProfile,
    request: &ArchiveRequest,
) -> Result<ArchiveInfo, ArchiveError> {
    let filename = archive_filename(profile, request)?;
    let group = resolve_group(profile, request.group.as_deref())?;

    let mut members = Vec::with_capacity(profile.archive_members.len());
    for member in &profile.archive_members {
        let source = request.source_root.join(expand(&member.source, group));
        if !source.exists() {
            return Err(ArchiveError::MissingSource { path: source });
        }
        members.push((source, member.name.clone()));
    }

    std::fs::create_dir_all(&request.out_dir).map_err(|e| io_err(&request.out_dir, e))?;
    let path = request.out_dir.join(&filename);
    let tmp = request.out_dir.join(format!("{filename}.tmp"));
    if let Err(e) = write_tar_gz(&tmp, &members) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }

    let (sha512, sha256) = hash_file(&path)?;
    let checksum_line = checksum_line(profile, request, &filename, &sha512, &sha256);
    tracing::info!("created {filename}");
    tracing::info!("SHA512: {sha512}");

    Ok(ArchiveInfo {
        filename,
        path,
        sha512,
        sha256,
        checksum_line,
    })
}

fn write_tar_gz(path: &Path, members: &[(PathBuf, String)]) -> Result<(), ArchiveError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for (source, name) in members {
        let appended = if source.is_dir() {
            builder.append_dir_all(name, source)
        } else {
            builder.append_path_with_name(source, name)
        };
        appended.map_err(|e| io_err(source, e))?;
        tracing::debug!("packed {} as {name}", source.display());
    }

    let encoder = builder.into_inner().map_err(|e| io_err(path, e))?;
    let mut writer = encoder.finish().map_err(|e| io_err(path, e))?;
    writer.flush().map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Streaming SHA-512 and SHA-256 of the file at `path`, hex encoded.
pub fn hash_file(path: &Path) -> Result<(String, String), ArchiveError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut sha512 = Sha512::new();
    let mut sha256 = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        sha512.update(&buf[..n]);
        sha256.update(&buf[..n]);
    }
    Ok((hex::encode(sha512.finalize()), hex::encode(sha256.finalize())))
}

fn checksum_line(
    profile: &SubjectProfile,
    request: &ArchiveRequest,
    filename: &str,
    sha512: &str,
    sha256: &str,
) -> Option<String> {
    let identifier = profile.checksum_identifier(request.group.as_deref(), &request.version);
    let mut fields = vec![identifier];
    if profile.checksum_has_platform {
        fields.push(request.platform.to_string());
    }
    for field in &profile.hash_fields {
        match field.as_str() {
            "sha512" => fields.push(sha512.to_string()),
            "sha256" => fields.push(sha256.to_string()),
            _ => return None,
        }
    }
    fields.push(filename.to_string());
    Some(fields.join(","))
}

/// Write `archive_info.txt` (`ARCHIVE_NAME=...` lines) into `dir`.
pub fn write_archive_info(dir: &Path, info: &ArchiveInfo) -> Result<PathBuf, ArchiveError> {
    let path = dir.join(ARCHIVE_INFO_FILE);
    let mut contents = format!(
        "ARCHIVE_NAME={}\nARCHIVE_SHA512={}\nARCHIVE_SHA256={}\n",
        info.filename, info.sha512, info.sha256
    );
    if let Some(line) = &info.checksum_line {
        contents.push_str(&format!("CHECKSUM_LINE={line}\n"));
    }
    std::fs::write(&path, contents).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
