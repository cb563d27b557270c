use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// Path of the resolved manifest on a manifest branch, relative to a tree root.
pub const MANIFEST_FILE: &str = "env.manifest";

/// Prefix that turns an environment branch name into its manifest branch name.
pub const MANIFEST_BRANCH_PREFIX: &str = "manifest/";

pub fn manifest_branch_name(env: &str) -> String {
    format!("{MANIFEST_BRANCH_PREFIX}{env}")
}

pub fn is_manifest_branch(branch: &str) -> bool {
    branch.starts_with(MANIFEST_BRANCH_PREFIX)
}

/// One resolved package: the source (channel URL plus subdir) it comes from
/// and its package reference (`<name>-<version>-<build>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManifestEntry {
    pub source: String,
    pub package: String,
}

impl ManifestEntry {
    pub fn new(source: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            package: package.into(),
        }
    }

    /// Package name without version and build string.
    pub fn name(&self) -> &str {
        package_name(&self.package)
    }
}

/// Strip the trailing `-<version>-<build>` fields from a package reference.
pub fn package_name(package: &str) -> &str {
    let mut fields = package.rsplitn(3, '-');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(_), Some(_), Some(name)) if !name.is_empty() => name,
        _ => package,
    }
}

/// The resolved, ordered package list of one environment.
///
/// Entries are sorted by the lowercased package reference so that resolving
/// the same spec twice produces byte-identical content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn from_entries(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| {
            a.package
                .to_lowercase()
                .cmp(&b.package.to_lowercase())
                .then_with(|| a.package.cmp(&b.package))
                .then_with(|| a.source.cmp(&b.source))
        });
        entries.dedup();
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ManifestEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `source<TAB>package` lines, newline-terminated.
    pub fn render(&self) -> String {
        let lines: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}\t{}", e.source, e.package))
            .collect();
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        let mut entries = Vec::new();
        for (idx, raw) in input.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let Some((source, package)) = line.split_once('\t') else {
                return Err(SchemaError::InvalidManifestLine {
                    line_no: idx + 1,
                    line: line.to_owned(),
                });
            };
            let (source, package) = (source.trim(), package.trim());
            if source.is_empty() || package.is_empty() || package.contains('\t') {
                return Err(SchemaError::InvalidManifestLine {
                    line_no: idx + 1,
                    line: line.to_owned(),
                });
            }
            entries.push(ManifestEntry::new(source, package));
        }
        Ok(Self::from_entries(entries))
    }

    pub fn parse_bytes(input: &[u8]) -> Result<Self, SchemaError> {
        let text = std::str::from_utf8(input).map_err(|_| SchemaError::NotUtf8(MANIFEST_FILE))?;
        Self::parse(text)
    }
}
