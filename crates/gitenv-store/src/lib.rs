//! Deployment target storage for gitenv.
//!
//! This crate owns everything gitenv writes under a deployment target:
//! the `TargetLayout` of installed trees, label pointers and lock files,
//! the `InstallRecord` that makes repeated deployments no-ops, relative
//! label symlinks, and best-effort permission lockdown of sensitive files.

pub mod layout;
pub mod links;
pub mod permissions;
pub mod record;

pub use layout::{lock_path_for, TargetLayout, LOCK_FILE_PREFIX, PKG_CACHE_DIR};
pub use links::{read_label, repoint_label, resolve_label, LinkAction};
pub use permissions::restrict_to_owner;
pub use record::{InstallRecord, RECORD_FILE};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    if cfg!(unix) {
        std::fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("target I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("install record {} is corrupt: expected checksum {expected}, got {actual}", .path.display())]
    CorruptRecord {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("{} exists and is not a label pointer", .0.display())]
    NotALabel(PathBuf),
}
