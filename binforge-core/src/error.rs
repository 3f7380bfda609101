//! Error types for binforge-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from metadata store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (save path).
    #[error("metadata serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error on load, with the offending file.
    #[error("failed to parse metadata at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document parsed as JSON but does not have the layout's shape.
    #[error("metadata at {path} does not match the {layout} layout: {reason}")]
    Shape {
        path: PathBuf,
        layout: &'static str,
        reason: String,
    },

    /// A flat or grouped layout was asked to persist a record it cannot express.
    #[error("record '{key}' cannot be written in the {layout} layout: {reason}")]
    Unrepresentable {
        key: String,
        layout: &'static str,
        reason: String,
    },
}

/// Errors from building or validating a subject profile.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error in the config file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The resulting profile violates an invariant of the generic engine.
    #[error("invalid {family} profile: {reason}")]
    Invalid { family: String, reason: String },

    /// A version string could not be turned into a subject key.
    #[error("cannot derive a subject key from '{version}': {reason}")]
    KeyDerivation { version: String, reason: String },
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
