//! Version-control substrate for gitenv.
//!
//! Wraps a `git2` repository with the operations the engines need: clone,
//! fetch, tracking branches, branch tips as immutable [`Snapshot`] handles,
//! file reads from snapshots, tree-level commits that are no-ops on unchanged
//! content, annotated tags, and push with non-fast-forward detection.

pub mod repository;

pub use repository::{https_supported, FileChange, GitRepo, Snapshot, TagInfo, ORIGIN};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("push conflict: {refspec} was rejected ({reason}); refetch and retry")]
    PushConflict { refspec: String, reason: String },
    #[error("cannot reach {0}: built without https support (enable the `https` feature)")]
    HttpsUnsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_conflict_display() {
        let e = RepoError::PushConflict {
            refspec: "refs/heads/default:refs/heads/default".to_owned(),
            reason: "non-fast-forward".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("push conflict:"));
        assert!(msg.contains("non-fast-forward"));
    }
}
