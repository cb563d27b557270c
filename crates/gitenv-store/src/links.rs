//! On-disk label pointers.
//!
//! On unix a label is a relative symlink `<env>/<label> -> <deployed-name>`,
//! so the whole target root can be moved. Elsewhere it is a small indirection
//! file holding the referent name, resolved with [`resolve_label`].

use crate::{fsync_dir, StoreError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Unchanged,
    Created,
    Replaced,
}

/// Referent of the label pointer at `link`, or `None` if there is none.
pub fn read_label(link: &Path) -> Result<Option<String>, StoreError> {
    let meta = match fs::symlink_metadata(link) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if meta.file_type().is_symlink() {
        let target = fs::read_link(link)?;
        return Ok(Some(target.to_string_lossy().into_owned()));
    }
    if cfg!(not(unix)) && meta.is_file() {
        return Ok(Some(fs::read_to_string(link)?.trim().to_owned()));
    }
    Err(StoreError::NotALabel(link.to_path_buf()))
}

/// Point `link` at `referent` (a name relative to the link's directory).
///
/// An existing pointer with the right referent is left alone; one with a
/// different referent is removed and recreated. Callers serialize writers
/// with the label lock.
pub fn repoint_label(link: &Path, referent: &str) -> Result<LinkAction, StoreError> {
    let action = match read_label(link)? {
        Some(current) if current == referent => return Ok(LinkAction::Unchanged),
        Some(_) => {
            fs::remove_file(link)?;
            LinkAction::Replaced
        }
        None => LinkAction::Created,
    };
    let parent = link.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    create_pointer(referent, link)?;
    fsync_dir(parent)?;
    Ok(action)
}

/// Directory a label pointer currently resolves to.
pub fn resolve_label(link: &Path) -> Result<Option<PathBuf>, StoreError> {
    let parent = link.parent().unwrap_or(Path::new("."));
    Ok(read_label(link)?.map(|referent| parent.join(referent)))
}

#[cfg(unix)]
fn create_pointer(referent: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(referent, link)
}

#[cfg(not(unix))]
fn create_pointer(referent: &str, link: &Path) -> io::Result<()> {
    fs::write(link, referent)
}
