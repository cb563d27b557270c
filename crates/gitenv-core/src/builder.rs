use crate::concurrency::shutdown_requested;
use crate::CoreError;
use gitenv_repo::{FileChange, GitRepo};
use gitenv_runtime::{strip_credentials, Credentials, PackageBackend, ResolveSpec, RuntimeError};
use gitenv_schema::{
    is_manifest_branch, manifest_branch_name, parse_spec_bytes, validate_env_name, EnvName,
    Manifest, ManifestEntry, MANIFEST_FILE, SPEC_FILE,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of building manifests for many environments.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    pub committed: Vec<EnvName>,
    pub unchanged: Vec<EnvName>,
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<(String, CoreError)>,
}

pub(crate) fn serialize_failures<S: serde::Serializer>(
    failures: &[(String, CoreError)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(failures.len()))?;
    for (what, err) in failures {
        map.serialize_entry(what, &err.to_string())?;
    }
    map.end()
}

/// Turns environment specs into committed manifests.
pub struct ManifestBuilder<'a> {
    repo: &'a GitRepo,
    backend: &'a dyn PackageBackend,
    credentials: Option<Credentials>,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(repo: &'a GitRepo, backend: &'a dyn PackageBackend) -> Self {
        Self {
            repo,
            backend,
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Resolve the spec on `branch` and commit the manifest to its manifest
    /// branch. Returns whether a commit was made.
    ///
    /// Manifest branches, branches whose name cannot form a tag, and branches
    /// without an `env.spec` are skipped.
    pub fn build(&self, branch: &str) -> Result<bool, CoreError> {
        if is_manifest_branch(branch) {
            debug!("{branch}: manifest branch, skipping");
            return Ok(false);
        }
        let env = match validate_env_name(branch) {
            Ok(env) => env,
            Err(e) => {
                warn!("skipping branch {branch}: {e}");
                return Ok(false);
            }
        };
        let tip = self
            .repo
            .branch_tip(branch)?
            .ok_or_else(|| CoreError::UnknownBranch(branch.to_owned()))?;
        let Some(spec_bytes) = self.repo.read_file(&tip, SPEC_FILE)? else {
            debug!("{branch}: no {SPEC_FILE}, not tracked");
            return Ok(false);
        };
        let spec = parse_spec_bytes(&spec_bytes)?;

        let channels = match &self.credentials {
            Some(credentials) => credentials.inject_all(&spec.channels)?,
            None => spec.channels.clone(),
        };
        info!("resolving {env}");
        let resolved = self
            .backend
            .resolve(&ResolveSpec {
                requirements: spec.requirements.clone(),
                channels,
            })
            .map_err(|e| match e {
                RuntimeError::Unsatisfiable(reason) => CoreError::UnsatisfiableSpec {
                    env: env.to_string(),
                    reason,
                },
                other => other.into(),
            })?;
        let manifest = Manifest::from_entries(
            resolved
                .into_iter()
                .map(|e| ManifestEntry::new(strip_credentials(&e.source), e.package))
                .collect(),
        );

        let manifest_branch = manifest_branch_name(&env);
        if !self.repo.has_branch(&manifest_branch) {
            info!("creating {manifest_branch} from {branch}");
            self.repo.create_branch(&manifest_branch, &tip)?;
        }
        let changes = [
            FileChange::write(MANIFEST_FILE, manifest.render()),
            FileChange::write(SPEC_FILE, spec_bytes),
        ];
        let message = format!(
            "Manifest update from {}.",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        let committed = self
            .repo
            .commit_changes(&manifest_branch, &changes, &message)?;
        match committed {
            Some(snapshot) => {
                info!("{manifest_branch}: committed {}", snapshot.commit_id());
                Ok(true)
            }
            None => {
                debug!("{manifest_branch}: manifest unchanged");
                Ok(false)
            }
        }
    }

    /// Build every local branch matching one of `patterns`. A failing
    /// environment is logged and recorded; the others still build.
    pub fn build_all(&self, patterns: &[glob::Pattern]) -> Result<BuildReport, CoreError> {
        let mut report = BuildReport::default();
        for branch in self.repo.local_branches()? {
            if shutdown_requested() {
                warn!("shutdown requested, stopping before {branch}");
                break;
            }
            if is_manifest_branch(&branch) || !patterns.iter().any(|p| p.matches(&branch)) {
                continue;
            }
            match self.build(&branch) {
                Ok(true) => report.committed.push(EnvName::from(branch)),
                Ok(false) => {
                    if self.repo.has_branch(&manifest_branch_name(&branch)) {
                        report.unchanged.push(EnvName::from(branch));
                    }
                }
                Err(e) => {
                    warn!("failed to build manifest for {branch}: {e}");
                    report.failures.push((branch, e));
                }
            }
        }
        Ok(report)
    }
}

/// Compile glob patterns; no patterns means "everything".
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>, CoreError> {
    if patterns.is_empty() {
        return compile_patterns(&["*".to_owned()]);
    }
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| CoreError::InvalidPattern {
                pattern: p.clone(),
                reason: e.msg.to_owned(),
            })
        })
        .collect()
}
