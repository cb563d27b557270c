use crate::backend::{InstallSpec, PackageBackend, ResolveSpec};
use crate::RuntimeError;
use gitenv_schema::ManifestEntry;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

const MOCK_VERSION: &str = "1.0";
const MOCK_BUILD: &str = "mock_0";
const META_DIR: &str = "conda-meta";

/// Deterministic in-process backend.
///
/// Resolves every requirement to `<name>-<version>-mock_0` from the first
/// channel's `noarch` subdir and installs each package as a `bin/<name>`
/// file plus a `conda-meta/<package>.json` record.
#[derive(Default)]
pub struct MockBackend {
    unsatisfiable: Vec<String>,
    resolves: AtomicUsize,
    installs: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requirements with these names fail to resolve.
    #[must_use]
    pub fn with_unsatisfiable(mut self, names: &[&str]) -> Self {
        self.unsatisfiable = names.iter().map(|&n| n.to_owned()).collect();
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn materialize_calls(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

/// Split `numpy=1.26`, `numpy >=1.2` or `numpy` into name and pinned version.
fn split_requirement(requirement: &str) -> (&str, Option<&str>) {
    let requirement = requirement.trim();
    let end = requirement
        .find(|c: char| c.is_whitespace() || "=<>!~".contains(c))
        .unwrap_or(requirement.len());
    let (name, rest) = requirement.split_at(end);
    let pinned = rest
        .strip_prefix('=')
        .map(|v| v.trim_start_matches('=').split(['=', ',']).next().unwrap_or(""))
        .filter(|v| !v.is_empty());
    (name, pinned)
}

impl PackageBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn resolve(&self, spec: &ResolveSpec) -> Result<Vec<ManifestEntry>, RuntimeError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let Some(channel) = spec.channels.first() else {
            return Err(RuntimeError::Unsatisfiable(
                "no channels to resolve from".to_owned(),
            ));
        };
        let source = format!("{}/noarch", channel.trim_end_matches('/'));
        spec.requirements
            .iter()
            .map(|req| {
                let (name, pinned) = split_requirement(req);
                if name.is_empty() || self.unsatisfiable.iter().any(|u| u == name) {
                    return Err(RuntimeError::Unsatisfiable(format!(
                        "no package satisfies '{req}'"
                    )));
                }
                let version = pinned.unwrap_or(MOCK_VERSION);
                Ok(ManifestEntry::new(
                    source.clone(),
                    format!("{name}-{version}-{MOCK_BUILD}"),
                ))
            })
            .collect()
    }

    fn materialize(&self, spec: &InstallSpec) -> Result<(), RuntimeError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        let bin = spec.target.join("bin");
        let meta = spec.target.join(META_DIR);
        fs::create_dir_all(&bin)?;
        fs::create_dir_all(&meta)?;
        fs::create_dir_all(&spec.pkgs_dir)?;

        let declared: BTreeSet<&str> = spec.entries.iter().map(|e| e.package.as_str()).collect();
        for item in fs::read_dir(&meta)? {
            let item = item?;
            let file = item.file_name().to_string_lossy().into_owned();
            let Some(package) = file.strip_suffix(".json") else {
                continue;
            };
            if !declared.contains(package) {
                let name = gitenv_schema::package_name(package);
                let _ = fs::remove_file(bin.join(name));
                fs::remove_file(item.path())?;
            }
        }

        let mut urls = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(spec.pkgs_dir.join("urls.txt"))?;
        for entry in &spec.entries {
            fs::write(bin.join(entry.name()), format!("#!/bin/sh\n# {}\n", entry.package))?;
            fs::write(
                meta.join(format!("{}.json", entry.package)),
                format!("{{\"url\": \"{}/{}\"}}\n", entry.source, entry.package),
            )?;
            writeln!(urls, "{}/{}", entry.source, entry.package)?;
        }
        Ok(())
    }

    fn sensitive_paths(&self, tree: &Path) -> Vec<PathBuf> {
        vec![tree.join(META_DIR)]
    }

    fn sensitive_cache_files(&self, pkgs_dir: &Path) -> Vec<PathBuf> {
        vec![pkgs_dir.join("urls.txt")]
    }
}
