use std::path::Path;
use tracing::{debug, warn};

/// Restrict `path` to its owner: `0600` for files, `0700` for directories.
///
/// Missing paths are skipped. Failures are logged and reported as `false`;
/// this protects cached credentials but is not required for correctness.
pub fn restrict_to_owner(path: &Path) -> bool {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return false;
    };
    if meta.file_type().is_symlink() {
        return false;
    }
    match set_owner_only(path, meta.is_dir()) {
        Ok(()) => {
            debug!("restricted permissions on {}", path.display());
            true
        }
        Err(e) => {
            warn!("could not restrict permissions on {}: {e}", path.display());
            false
        }
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path, is_dir: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if is_dir { 0o700 } else { 0o600 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path, _is_dir: bool) -> std::io::Result<()> {
    Ok(())
}
