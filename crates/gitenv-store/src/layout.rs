use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of the sibling file that guards a locked path.
pub const LOCK_FILE_PREFIX: &str = ".gitenv-lock_";
/// Package cache shared by every environment deployed under one target root.
pub const PKG_CACHE_DIR: &str = ".pkg_cache";

/// Directory layout of a deployment target.
///
/// ```text
/// <root>/
///   .pkg_cache/                 shared package cache
///   .gitenv-lock_<label>        label lock (one per label name)
///   <env>/
///     .gitenv-lock_<deployed>   install lock for one tree
///     <deployed>/...            installed tree
///     <label> -> <deployed>     label pointer (relative)
/// ```
#[derive(Debug, Clone)]
pub struct TargetLayout {
    root: PathBuf,
}

impl TargetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn env_dir(&self, env: &str) -> PathBuf {
        self.root.join(env)
    }

    #[inline]
    pub fn deployed_dir(&self, env: &str, deployed_name: &str) -> PathBuf {
        self.env_dir(env).join(deployed_name)
    }

    #[inline]
    pub fn label_link(&self, env: &str, label: &str) -> PathBuf {
        self.env_dir(env).join(label)
    }

    /// The path whose lock serialises writes to `label` across all
    /// environments: `<root>/<label>`.
    #[inline]
    pub fn label_lock_scope(&self, label: &str) -> PathBuf {
        self.root.join(label)
    }

    #[inline]
    pub fn pkg_cache_dir(&self) -> PathBuf {
        self.root.join(PKG_CACHE_DIR)
    }

    /// Lock file of one cached package reference.
    #[inline]
    pub fn pkg_lock_file(&self, package: &str) -> PathBuf {
        self.pkg_cache_dir()
            .join(".locks")
            .join(format!("{package}.lock"))
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.pkg_cache_dir())?;
        Ok(())
    }
}

/// Sibling lock file for `path`: `<parent>/.gitenv-lock_<basename>`.
///
/// Locking a sibling rather than the path itself lets the path be created,
/// replaced or removed while the lock is held.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let base = path
        .file_name()
        .map_or_else(|| "root".to_owned(), |n| n.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{LOCK_FILE_PREFIX}{base}"))
}
