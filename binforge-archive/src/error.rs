//! Error types for binforge-archive.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while packaging an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Build timestamps are mandatory and must be `YYYYMMDDHHMMSS`.
    #[error("invalid build timestamp '{timestamp}': {reason}")]
    InvalidTimestamp { timestamp: String, reason: String },

    /// The service name is missing, unexpected, or not configured.
    #[error("invalid service: {reason}")]
    InvalidGroup { reason: String },

    #[error("version must be non-empty")]
    EmptyVersion,

    /// A configured archive member does not exist under the source root.
    #[error("archive source not found: {path}")]
    MissingSource { path: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`ArchiveError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.into(),
        source,
    }
}
