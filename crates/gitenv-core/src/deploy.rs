//! Deployment engine: bring a target root into agreement with the labels.
//!
//! For each environment, every labelled tag (plus the derived `latest`)
//! that matches the caller's `<env>/<label>` patterns is materialized once
//! under `<target>/<env>/<deployed-name>` while holding that tree's lock.
//! Only then are label symlinks repointed, each under the lock for its label
//! name, so a label never points at a tree that is still being installed.

use crate::builder::{compile_patterns, serialize_failures};
use crate::concurrency::{acquire_package_locks, shutdown_requested, DirLock, LockOptions};
use crate::labels::{latest_tag, read_labels};
use crate::CoreError;
use gitenv_repo::GitRepo;
use gitenv_runtime::{apply_mirror, Credentials, InstallSpec, PackageBackend};
use gitenv_schema::{
    is_manifest_branch, manifest_branch_name, parse_spec_bytes, parse_tag, validate_env_name,
    EnvName, EnvSpec, LabelName, Manifest, TagName, LATEST, MANIFEST_FILE, SPEC_FILE,
};
use gitenv_store::{repoint_label, restrict_to_owner, InstallRecord, LinkAction, TargetLayout};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub patterns: Vec<glob::Pattern>,
    pub mirror: Option<String>,
    pub credentials: Option<Credentials>,
    pub lock: LockOptions,
}

impl DeployOptions {
    /// Options selecting `<env>/<label>` pairs by glob; no patterns selects
    /// every pair.
    pub fn new(patterns: &[String]) -> Result<Self, CoreError> {
        Ok(Self {
            patterns: compile_patterns(patterns)?,
            mirror: None,
            credentials: None,
            lock: LockOptions::default(),
        })
    }
}

/// One label pointer brought up to date.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEvent {
    pub env: EnvName,
    pub label: LabelName,
    pub tag: TagName,
    pub deployed_name: String,
    #[serde(skip)]
    pub action: LinkAction,
}

#[derive(Debug, Default, Serialize)]
pub struct DeployReport {
    pub installed: Vec<TagName>,
    pub unchanged: Vec<TagName>,
    pub linked: Vec<LinkEvent>,
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<(String, CoreError)>,
}

pub struct Deployer<'a> {
    repo: &'a GitRepo,
    backend: &'a dyn PackageBackend,
    layout: TargetLayout,
    options: DeployOptions,
}

impl<'a> Deployer<'a> {
    pub fn new(
        repo: &'a GitRepo,
        backend: &'a dyn PackageBackend,
        target: impl Into<PathBuf>,
        options: DeployOptions,
    ) -> Self {
        Self {
            repo,
            backend,
            layout: TargetLayout::new(target),
            options,
        }
    }

    /// Environment branches that have a manifest branch.
    pub fn environments(&self) -> Result<Vec<EnvName>, CoreError> {
        Ok(self
            .repo
            .local_branches()?
            .into_iter()
            .filter(|b| !is_manifest_branch(b))
            .filter(|b| self.repo.has_branch(&manifest_branch_name(b)))
            .filter_map(|b| validate_env_name(&b).ok())
            .collect())
    }

    /// `(label, tag)` pairs of `env` selected by the patterns, `latest`
    /// included.
    pub fn labelled_tags(&self, env: &EnvName) -> Result<Vec<(LabelName, TagName)>, CoreError> {
        let mut all = match self.repo.branch_tip(env)? {
            Some(tip) => read_labels(self.repo, &tip)?,
            None => return Err(CoreError::UnknownBranch(env.to_string())),
        };
        if let Some(latest) = latest_tag(&self.repo.tags()?, env) {
            all.insert(LabelName::from(LATEST), latest);
        }
        Ok(all
            .into_iter()
            .filter(|(label, _)| {
                let key = format!("{env}/{label}");
                self.options.patterns.iter().any(|p| p.matches(&key))
            })
            .collect())
    }

    /// Deploy every environment. Failures are per tag or per environment and
    /// are collected in the report; they never stop the other environments.
    pub fn deploy(&self) -> Result<DeployReport, CoreError> {
        self.layout.initialize()?;
        let mut report = DeployReport::default();
        for env in self.environments()? {
            if shutdown_requested() {
                warn!("shutdown requested, stopping before {env}");
                break;
            }
            if let Err(e) = self.deploy_env(&env, &mut report) {
                warn!("failed to deploy {env}: {e}");
                report.failures.push((env.into_inner(), e));
            }
        }
        Ok(report)
    }

    fn deploy_env(&self, env: &EnvName, report: &mut DeployReport) -> Result<(), CoreError> {
        let labelled = self.labelled_tags(env)?;
        if labelled.is_empty() {
            debug!("{env}: no selected labels");
            return Ok(());
        }

        let wanted: BTreeSet<&TagName> = labelled.iter().map(|(_, tag)| tag).collect();
        let mut ready = BTreeSet::new();
        for tag in wanted {
            match self.materialize(tag) {
                Ok(true) => report.installed.push(tag.clone()),
                Ok(false) => report.unchanged.push(tag.clone()),
                Err(e) => {
                    warn!("failed to deploy {tag}: {e}");
                    report.failures.push((tag.to_string(), e));
                    continue;
                }
            }
            ready.insert(tag.clone());
        }

        for (label, tag) in labelled {
            if !ready.contains(&tag) {
                continue;
            }
            let key = format!("{env}/{label}");
            match self.link(env, label, tag) {
                Ok(event) => report.linked.push(event),
                Err(e) => {
                    warn!("failed to link {key}: {e}");
                    report.failures.push((key, e));
                }
            }
        }
        Ok(())
    }

    /// Install `tag` into its tree. Returns `false` when the tree already
    /// holds exactly this content.
    pub fn materialize(&self, tag: &TagName) -> Result<bool, CoreError> {
        let info = self
            .repo
            .find_tag(tag)?
            .ok_or_else(|| CoreError::UnknownTag(tag.to_string()))?;
        let parsed = parse_tag(tag)?;
        let manifest_bytes = self
            .repo
            .read_file(&info.target, MANIFEST_FILE)?
            .ok_or_else(|| CoreError::MissingManifest(tag.to_string()))?;
        let manifest = Manifest::parse_bytes(&manifest_bytes)?;
        let spec = match self.repo.read_file(&info.target, SPEC_FILE)? {
            Some(bytes) => parse_spec_bytes(&bytes)?,
            None => EnvSpec::default(),
        };

        let (entries, channels) = match &self.options.mirror {
            Some(mirror) => apply_mirror(manifest.entries(), mirror),
            None => (manifest.into_entries(), spec.channels),
        };
        let rendered = Manifest::from_entries(entries.clone()).render();
        let digest = InstallRecord::compute_digest(&rendered, &channels);

        let tree = self.layout.deployed_dir(&parsed.env, &parsed.deployed_name);
        let _tree_lock = DirLock::acquire(&tree, &self.options.lock)?;
        if InstallRecord::matches(&tree, &digest) {
            debug!("{} already holds {tag}", tree.display());
            return Ok(false);
        }

        let (entries, channels) = match &self.options.credentials {
            Some(credentials) => (
                credentials.inject_sources(&entries)?,
                credentials.inject_all(&channels)?,
            ),
            None => (entries, channels),
        };
        let pkgs_dir = self.layout.pkg_cache_dir();
        info!("installing {tag} into {}", tree.display());
        {
            let _pkg_locks = if self.backend.atomic_fetch() {
                Vec::new()
            } else {
                acquire_package_locks(
                    &self.layout,
                    entries.iter().map(|e| e.package.as_str()),
                    &self.options.lock,
                )?
            };
            self.backend.materialize(&InstallSpec {
                entries,
                channels,
                target: tree.clone(),
                pkgs_dir: pkgs_dir.clone(),
            })?;
        }
        InstallRecord::new(tag.clone(), digest).write(&tree)?;

        for path in self
            .backend
            .sensitive_paths(&tree)
            .into_iter()
            .chain(self.backend.sensitive_cache_files(&pkgs_dir))
        {
            restrict_to_owner(&path);
        }
        Ok(true)
    }

    fn link(&self, env: &EnvName, label: LabelName, tag: TagName) -> Result<LinkEvent, CoreError> {
        let deployed_name = parse_tag(&tag)?.deployed_name;
        let _label_lock =
            DirLock::acquire(&self.layout.label_lock_scope(&label), &self.options.lock)?;
        let action = repoint_label(&self.layout.label_link(env, &label), &deployed_name)?;
        if action == LinkAction::Unchanged {
            debug!("{env}/{label} already points at {deployed_name}");
        } else {
            info!("linking {env}/{label} to {deployed_name} ({tag})");
        }
        Ok(LinkEvent {
            env: env.clone(),
            label,
            tag,
            deployed_name,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_select_everything() {
        let options = DeployOptions::new(&[]).unwrap();
        assert!(options.patterns[0].matches("default/next"));
        assert!(options.lock.stale_after.is_none());
    }

    #[test]
    fn star_crosses_the_env_separator() {
        let options = DeployOptions::new(&["*/current".to_owned()]).unwrap();
        assert!(options.patterns[0].matches("default/current"));
        assert!(!options.patterns[0].matches("default/next"));
    }
}
