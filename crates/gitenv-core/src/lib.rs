//! Versioning and promotion engines for gitenv.
//!
//! The four engines run in dependency order over one repository clone:
//! `ManifestBuilder` resolves each environment's spec into a committed,
//! canonically ordered manifest; `SnapshotTagger` tags untagged manifest
//! commits; `LabelPromoter` shifts the `previous <- current <- next` chain
//! on an environment branch; `Deployer` materializes labelled snapshots under
//! a target root and repoints label symlinks, under bounded-wait locks.

pub mod builder;
pub mod concurrency;
pub mod deploy;
pub mod labels;
pub mod tagger;

pub use builder::{compile_patterns, BuildReport, ManifestBuilder};
pub use concurrency::{
    acquire_package_locks, install_signal_handler, shutdown_requested, DirLock, LockOptions,
};
pub use deploy::{DeployOptions, DeployReport, Deployer, LinkEvent};
pub use labels::{latest_tag, read_labels, LabelPromoter};
pub use tagger::{NewSnapshots, SnapshotTagger};

use gitenv_repo::RepoError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsatisfiable spec for environment '{env}': {reason}")]
    UnsatisfiableSpec { env: String, reason: String },
    #[error("tag '{0}' has no env.manifest")]
    MissingManifest(String),
    #[error("unknown tag '{0}'")]
    UnknownTag(String),
    #[error("unknown branch '{0}'")]
    UnknownBranch(String),
    #[error("timed out after {waited:?} waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },
    #[error("push conflict on {refspec}: {reason}")]
    PushConflict { refspec: String, reason: String },
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("schema error: {0}")]
    Schema(#[from] gitenv_schema::SchemaError),
    #[error("store error: {0}")]
    Store(#[from] gitenv_store::StoreError),
    #[error("repository error: {0}")]
    Repo(RepoError),
    #[error("runtime error: {0}")]
    Runtime(#[from] gitenv_runtime::RuntimeError),
}

impl From<RepoError> for CoreError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::PushConflict { refspec, reason } => {
                CoreError::PushConflict { refspec, reason }
            }
            other => CoreError::Repo(other),
        }
    }
}

impl CoreError {
    /// Transient failures a scheduler should simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::LockTimeout { .. } | CoreError::PushConflict { .. }
        )
    }

    /// Failures caused by repository content or caller input rather than by
    /// the machine the command runs on.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::UnsatisfiableSpec { .. }
                | CoreError::MissingManifest(_)
                | CoreError::UnknownTag(_)
                | CoreError::UnknownBranch(_)
                | CoreError::InvalidPattern { .. }
                | CoreError::Schema(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_conflicts_surface_as_retryable() {
        let e: CoreError = RepoError::PushConflict {
            refspec: "refs/heads/default".to_owned(),
            reason: "non-fast-forward".to_owned(),
        }
        .into();
        assert!(matches!(e, CoreError::PushConflict { .. }));
        assert!(e.is_retryable());
        assert!(!e.is_input_error());
    }

    #[test]
    fn unknown_names_are_input_errors() {
        assert!(CoreError::UnknownTag("env-x-2024_01_01".to_owned()).is_input_error());
        assert!(CoreError::UnknownBranch("x".to_owned()).is_input_error());
        assert!(!CoreError::UnknownTag("t".to_owned()).is_retryable());
    }

    #[test]
    fn lock_timeout_names_the_lock() {
        let e = CoreError::LockTimeout {
            path: PathBuf::from("/srv/envs/.gitenv-lock_next"),
            waited: Duration::from_secs(1),
        };
        assert!(e.to_string().contains(".gitenv-lock_next"));
        assert!(e.is_retryable());
    }
}
