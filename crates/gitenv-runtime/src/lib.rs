//! Package resolver and installer backends for gitenv.
//!
//! Everything gitenv needs from a package manager goes through the
//! `PackageBackend` trait: resolve a spec to a concrete package list, and
//! materialize such a list into a directory. `conda` drives the real tool;
//! `mock` is deterministic and used by tests. The `channel` module rewrites
//! channel URLs for credentials and mirrors.

pub mod backend;
pub mod channel;
pub mod conda;
pub mod mock;

pub use backend::{select_backend, BackendOptions, InstallSpec, PackageBackend, ResolveSpec};
pub use channel::{apply_mirror, strip_credentials, Credentials};
pub use mock::MockBackend;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("unsatisfiable spec: {0}")]
    Unsatisfiable(String),
    #[error("package manager execution failed: {0}")]
    ExecFailed(String),
    #[error("unexpected package manager output: {0}")]
    InvalidOutput(String),
    #[error("invalid channel URL: {0}")]
    InvalidUrl(String),
}
