//! Persisted formats for gitenv.
//!
//! This crate defines what lives in the tracking repository: the declared
//! environment spec (`env.spec`), the resolved and canonically ordered
//! manifest (`env.manifest`), snapshot tag naming (`env-<env>-<YYYY_MM_DD>[-n]`),
//! and label files with the `previous <- current <- next` promotion plan.

pub mod label;
pub mod manifest;
pub mod spec;
pub mod tag;
pub mod types;

pub use label::{
    apply_updates, label_file_path, label_from_file_name, parse_label_contents, plan_promotion,
    LabelUpdate, CURRENT, LABELS_DIR, LABEL_PROGRESSION, LATEST, NEXT, PREVIOUS,
};
pub use manifest::{
    is_manifest_branch, manifest_branch_name, package_name, Manifest, ManifestEntry,
    MANIFEST_BRANCH_PREFIX, MANIFEST_FILE,
};
pub use spec::{parse_spec_bytes, parse_spec_str, validate_env_name, EnvSpec, SPEC_FILE};
pub use tag::{commit_date, parse_tag, snapshot_tag_base, snapshot_tag_candidate, ParsedTag};
pub use types::{EnvName, LabelName, TagName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse env.spec: {0}")]
    ParseSpec(#[from] serde_yaml::Error),
    #[error("{0} is not valid UTF-8")]
    NotUtf8(&'static str),
    #[error("invalid env.manifest line {line_no}: '{line}', expected '<source>\\t<package>'")]
    InvalidManifestLine { line_no: usize, line: String },
    #[error("invalid environment name '{name}': {reason}")]
    InvalidEnvName { name: String, reason: &'static str },
    #[error("invalid tag name '{0}', expected 'env-<environment>-<name>'")]
    InvalidTagName(String),
    #[error("commit timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}
