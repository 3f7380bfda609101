//! # binforge-reconcile
//!
//! Version reconciliation engine.
//!
//! [`reconcile_diff`] turns a feed snapshot and the stored metadata into a
//! build plan plus an end-of-life list; [`reconcile`] folds archive checksums
//! back into the store; [`remove_subjects`] retires end-of-life records. The
//! [`pipeline`] module wraps each stage with load/save for the CLI.

pub mod checksum;
pub mod diff;
pub mod eol;
pub mod error;
pub mod feed;
pub mod pipeline;
pub mod reconcile;

pub use checksum::{parse_checksums, ChecksumSet};
pub use diff::{reconcile_diff, DiffOutcome};
pub use eol::{parse_eol_list, remove_subjects};
pub use error::{FeedError, SyncError};
pub use feed::{load_feed, FeedFormat};
pub use reconcile::{reconcile, ReconcileSummary};
