//! Error types for binforge-reconcile.

use std::path::PathBuf;

use thiserror::Error;

use binforge_core::{ConfigError, Platform, StoreError, SubjectKey};

/// All errors that can arise from the diff, reconcile and cleanup stages.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A build plan entry has no matching checksum record.
    #[error("no checksum found for {identifier}{} - build incomplete", on_platform(.platform))]
    MissingChecksum {
        identifier: String,
        platform: Option<Platform>,
    },

    /// Checksum input does not have the expected structure or field count.
    #[error("malformed checksum input at {location}: {reason}")]
    MalformedChecksum { location: String, reason: String },

    /// A build plan entry cannot seed or refresh a version record.
    #[error("incomplete build plan entry for '{key}': {reason}")]
    IncompletePlanEntry { key: SubjectKey, reason: String },

    /// Two buildable feed entries derive to the same metadata key.
    #[error("feed entries '{first}' and '{second}' both map to '{key}'")]
    DuplicateFeedKey {
        key: SubjectKey,
        first: String,
        second: String,
    },

    /// A JSON payload handed over between stages did not parse.
    #[error("malformed {what}: {source}")]
    Payload {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("profile error: {0}")]
    Config(#[from] ConfigError),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (stage outputs).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from reading a feed snapshot.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse feed at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A required member is absent from a feed entry.
    #[error("feed entry '{entry}' is missing '{field}'")]
    MissingField { entry: String, field: String },

    /// A member is present but has the wrong type or an empty value.
    #[error("feed entry '{entry}' has an invalid '{field}': {reason}")]
    InvalidField {
        entry: String,
        field: String,
        reason: String,
    },

    /// A line of a text version report could not be understood.
    #[error("version report line {line}: {reason}")]
    Report { line: usize, reason: String },
}

fn on_platform(platform: &Option<Platform>) -> String {
    platform
        .as_ref()
        .map(|p| format!(" on {p}"))
        .unwrap_or_default()
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
