//! binforge core library: domain types, subject profiles, metadata store
//! persistence and errors.
//!
//! - [`types`]: newtypes, records, feed and plan structs
//! - [`profile`]: [`SubjectProfile`] and the YAML [`Config`]
//! - [`store`]: load / save per store layout
//! - [`clock`]: timestamp formatting
//! - [`error`]: [`StoreError`], [`ConfigError`]

pub mod clock;
pub mod error;
pub mod profile;
pub mod store;
pub mod types;

pub use error::{ConfigError, StoreError};
pub use profile::{Config, Family, FreshnessRule, KeyScheme, StoreLayout, SubjectProfile};
pub use types::{
    BuildEntry, BuildPlan, BuildPlanEntry, ChecksumRecord, Feed, FeedEntry, FeedStatus,
    MetadataStore, Platform, ReleaseMeta, SubjectKey, VersionRecord,
};
