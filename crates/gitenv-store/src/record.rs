use crate::{fsync_dir, StoreError};
use gitenv_schema::TagName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const RECORD_FILE: &str = ".gitenv-install.json";

/// What was last materialized into an installed tree.
///
/// Written only after the installer succeeds, so a record that matches the
/// requested digest means the tree is complete and need not be touched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallRecord {
    pub tag: TagName,
    pub digest: String,
    pub installed_at: String,
    /// blake3 checksum over the other fields. `None` for hand-written records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl InstallRecord {
    pub fn new(tag: TagName, digest: String) -> Self {
        Self {
            tag,
            digest,
            installed_at: chrono::Utc::now().to_rfc3339(),
            checksum: None,
        }
    }

    /// Digest of everything that determines an installed tree's contents.
    pub fn compute_digest(manifest: &str, channels: &[String]) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"manifest:");
        hasher.update(manifest.as_bytes());
        for channel in channels {
            hasher.update(format!("channel:{channel}\n").as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn path_in(tree: &Path) -> PathBuf {
        tree.join(RECORD_FILE)
    }

    pub fn write(&self, tree: &Path) -> Result<(), StoreError> {
        let mut with_checksum = self.clone();
        with_checksum.checksum = Some(with_checksum.compute_checksum()?);
        let content = serde_json::to_string_pretty(&with_checksum)?;

        let mut tmp = NamedTempFile::new_in(tree)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(Self::path_in(tree))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(tree)?;
        Ok(())
    }

    /// Read the record of `tree`. Missing records read as `None`; corrupt
    /// ones are an error.
    pub fn read(tree: &Path) -> Result<Option<Self>, StoreError> {
        let path = Self::path_in(tree);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let record: InstallRecord = serde_json::from_str(&content)?;
        if let Some(ref expected) = record.checksum {
            let actual = record.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::CorruptRecord {
                    path,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(Some(record))
    }

    pub fn matches(tree: &Path, digest: &str) -> bool {
        match Self::read(tree) {
            Ok(Some(record)) => record.digest == digest,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("ignoring unreadable install record in {}: {e}", tree.display());
                false
            }
        }
    }
}
