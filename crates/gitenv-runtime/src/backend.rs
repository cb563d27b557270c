use crate::RuntimeError;
use gitenv_schema::ManifestEntry;
use std::path::{Path, PathBuf};

/// What to resolve: requirement strings and a priority-ordered channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveSpec {
    pub requirements: Vec<String>,
    pub channels: Vec<String>,
}

/// What to install, and where.
///
/// `pkgs_dir` is the package cache for this one call. Backends must scope it
/// to the call (e.g. the child process environment) and never set it globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSpec {
    pub entries: Vec<ManifestEntry>,
    pub channels: Vec<String>,
    pub target: PathBuf,
    pub pkgs_dir: PathBuf,
}

/// Options shared by the backends `select_backend` can build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    pub conda_exe: String,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            conda_exe: "conda".to_owned(),
        }
    }
}

pub trait PackageBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Resolve a spec to a concrete package set, or fail with
    /// [`RuntimeError::Unsatisfiable`].
    fn resolve(&self, spec: &ResolveSpec) -> Result<Vec<ManifestEntry>, RuntimeError>;

    /// Make `spec.target` contain exactly `spec.entries`. Must be safe to call
    /// on an already installed tree.
    fn materialize(&self, spec: &InstallSpec) -> Result<(), RuntimeError>;

    /// Whether the backend guarantees atomic fetches into a shared package
    /// cache. When it does not, callers lock each package reference.
    fn atomic_fetch(&self) -> bool {
        false
    }

    /// Paths inside an installed tree that may embed credentials.
    fn sensitive_paths(&self, _tree: &Path) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Files in the package cache that may embed credentials.
    fn sensitive_cache_files(&self, _pkgs_dir: &Path) -> Vec<PathBuf> {
        Vec::new()
    }
}

pub fn select_backend(
    name: &str,
    options: &BackendOptions,
) -> Result<Box<dyn PackageBackend>, RuntimeError> {
    match name {
        "conda" => Ok(Box::new(crate::conda::CondaBackend::new(
            &options.conda_exe,
        ))),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
