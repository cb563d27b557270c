use crate::backend::{InstallSpec, PackageBackend, ResolveSpec};
use crate::RuntimeError;
use gitenv_schema::ManifestEntry;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const PKGS_DIRS_VAR: &str = "CONDA_PKGS_DIRS";
const PACKAGE_SUFFIX: &str = ".tar.bz2";

/// Exceptions conda raises when a spec cannot be satisfied.
const UNSATISFIABLE_EXCEPTIONS: &[&str] = &[
    "PackagesNotFoundError",
    "UnsatisfiableError",
    "ResolvePackageNotFound",
    "SpecsConfigurationConflictError",
];

/// Drives the `conda` executable: `create --dry-run --json` to resolve and
/// `create --file <explicit list>` to install.
pub struct CondaBackend {
    exe: String,
}

impl CondaBackend {
    pub fn new(exe: &str) -> Self {
        Self {
            exe: exe.to_owned(),
        }
    }

    fn run(&self, args: &[String], pkgs_dir: Option<&Path>) -> Result<std::process::Output, RuntimeError> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(args);
        if let Some(dir) = pkgs_dir {
            cmd.env(PKGS_DIRS_VAR, dir);
        }
        debug!("running {} {}", self.exe, args.join(" "));
        cmd.output()
            .map_err(|e| RuntimeError::ExecFailed(format!("{} failed to start: {e}", self.exe)))
    }
}

impl PackageBackend for CondaBackend {
    fn name(&self) -> &'static str {
        "conda"
    }

    fn available(&self) -> bool {
        Command::new(&self.exe)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn resolve(&self, spec: &ResolveSpec) -> Result<Vec<ManifestEntry>, RuntimeError> {
        let scratch = tempfile::tempdir()?;
        let args = dry_run_args(spec, &scratch.path().join("env"));
        let output = self.run(&args, None)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = parse_dry_run(&stdout)?;
        if !output.status.success() && entries.is_empty() {
            return Err(RuntimeError::ExecFailed(format!(
                "conda resolve exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(entries)
    }

    fn materialize(&self, spec: &InstallSpec) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&spec.pkgs_dir)?;
        let mut explicit = tempfile::NamedTempFile::new()?;
        explicit.write_all(render_explicit(&spec.entries).as_bytes())?;
        explicit.as_file().sync_all()?;

        info!(
            "installing {} packages into {}",
            spec.entries.len(),
            spec.target.display()
        );
        let args = vec![
            "create".to_owned(),
            "--yes".to_owned(),
            "--quiet".to_owned(),
            "--prefix".to_owned(),
            spec.target.to_string_lossy().into_owned(),
            "--file".to_owned(),
            explicit.path().to_string_lossy().into_owned(),
        ];
        let output = self.run(&args, Some(&spec.pkgs_dir))?;
        if !output.status.success() {
            return Err(RuntimeError::ExecFailed(format!(
                "conda install into {} failed: {}",
                spec.target.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn sensitive_paths(&self, tree: &Path) -> Vec<PathBuf> {
        vec![tree.join("conda-meta")]
    }

    fn sensitive_cache_files(&self, pkgs_dir: &Path) -> Vec<PathBuf> {
        vec![pkgs_dir.join("urls.txt"), pkgs_dir.join("urls")]
    }
}

fn dry_run_args(spec: &ResolveSpec, prefix: &Path) -> Vec<String> {
    let mut args = vec![
        "create".to_owned(),
        "--dry-run".to_owned(),
        "--json".to_owned(),
        "--yes".to_owned(),
        "--override-channels".to_owned(),
        "--prefix".to_owned(),
        prefix.to_string_lossy().into_owned(),
    ];
    for channel in &spec.channels {
        args.push("--channel".to_owned());
        args.push(channel.clone());
    }
    args.extend(spec.requirements.iter().cloned());
    args
}

#[derive(Debug, Default, Deserialize)]
struct DryRunReport {
    #[serde(default)]
    actions: DryRunActions,
    #[serde(default)]
    exception_name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DryRunActions {
    #[serde(default, rename = "LINK")]
    link: Vec<LinkedPackage>,
}

#[derive(Debug, Deserialize)]
struct LinkedPackage {
    base_url: String,
    platform: String,
    dist_name: String,
}

fn parse_dry_run(stdout: &str) -> Result<Vec<ManifestEntry>, RuntimeError> {
    let report: DryRunReport = serde_json::from_str(stdout)
        .map_err(|e| RuntimeError::InvalidOutput(format!("conda --json output: {e}")))?;

    if let Some(exception) = report.exception_name {
        let message = report.error.unwrap_or_else(|| exception.clone());
        if UNSATISFIABLE_EXCEPTIONS.contains(&exception.as_str()) {
            return Err(RuntimeError::Unsatisfiable(message));
        }
        return Err(RuntimeError::ExecFailed(message));
    }

    Ok(report
        .actions
        .link
        .into_iter()
        .map(|pkg| {
            let source = format!("{}/{}", pkg.base_url.trim_end_matches('/'), pkg.platform);
            ManifestEntry::new(source, pkg.dist_name)
        })
        .collect())
}

/// Explicit package list, one package archive URL per line.
fn render_explicit(entries: &[ManifestEntry]) -> String {
    let mut out = String::from("@EXPLICIT\n");
    for entry in entries {
        out.push_str(entry.source.trim_end_matches('/'));
        out.push('/');
        out.push_str(&entry.package);
        out.push_str(PACKAGE_SUFFIX);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linked_packages() {
        let json = r#"{
            "actions": {
                "LINK": [
                    {"base_url": "https://conda.example.com/main", "platform": "linux-64",
                     "dist_name": "python-3.12.1-h1", "channel": "main"},
                    {"base_url": "https://conda.example.com/main/", "platform": "noarch",
                     "dist_name": "pip-24.0-py_0", "channel": "main"}
                ],
                "PREFIX": "/tmp/x"
            },
            "dry_run": true,
            "success": true
        }"#;
        let entries = parse_dry_run(json).unwrap();
        assert_eq!(
            entries,
            vec![
                ManifestEntry::new("https://conda.example.com/main/linux-64", "python-3.12.1-h1"),
                ManifestEntry::new("https://conda.example.com/main/noarch", "pip-24.0-py_0"),
            ]
        );
    }

    #[test]
    fn packages_not_found_is_unsatisfiable() {
        let json = r#"{"exception_name": "PackagesNotFoundError",
                       "error": "PackagesNotFoundError: nosuchpkg"}"#;
        assert!(matches!(
            parse_dry_run(json),
            Err(RuntimeError::Unsatisfiable(msg)) if msg.contains("nosuchpkg")
        ));
    }

    #[test]
    fn other_exceptions_are_exec_failures() {
        let json = r#"{"exception_name": "CondaHTTPError", "error": "HTTP 000"}"#;
        assert!(matches!(parse_dry_run(json), Err(RuntimeError::ExecFailed(_))));
    }

    #[test]
    fn garbage_output_is_invalid() {
        assert!(matches!(
            parse_dry_run("Solving environment: done"),
            Err(RuntimeError::InvalidOutput(_))
        ));
    }

    #[test]
    fn explicit_file_lists_archive_urls() {
        let entries = vec![ManifestEntry::new("https://c/main/linux-64/", "python-3.12.1-h1")];
        assert_eq!(
            render_explicit(&entries),
            "@EXPLICIT\nhttps://c/main/linux-64/python-3.12.1-h1.tar.bz2\n"
        );
    }

    #[test]
    fn mirrored_archives_keep_their_subdir() {
        let entries = vec![ManifestEntry::new(
            "https://repo.anaconda.com/pkgs/main/linux-64",
            "python-3.12.1-h1",
        )];
        let (mirrored, _) = crate::apply_mirror(&entries, "https://mirror.example.com/main");
        assert_eq!(
            render_explicit(&mirrored),
            "@EXPLICIT\nhttps://mirror.example.com/main/linux-64/python-3.12.1-h1.tar.bz2\n"
        );
    }

    #[test]
    fn dry_run_overrides_channels_in_order() {
        let spec = ResolveSpec {
            requirements: vec!["python".to_owned()],
            channels: vec!["https://a".to_owned(), "https://b".to_owned()],
        };
        let args = dry_run_args(&spec, Path::new("/tmp/p"));
        let a = args.iter().position(|x| x == "https://a").unwrap();
        let b = args.iter().position(|x| x == "https://b").unwrap();
        assert!(a < b);
        assert!(args.contains(&"--override-channels".to_owned()));
        assert_eq!(args.last().map(String::as_str), Some("python"));
    }

    #[test]
    fn cache_url_lists_are_sensitive() {
        let files = CondaBackend::new("conda").sensitive_cache_files(Path::new("/t/.pkg_cache"));
        assert!(files.contains(&PathBuf::from("/t/.pkg_cache/urls.txt")));
        assert!(files.contains(&PathBuf::from("/t/.pkg_cache/urls")));
    }
}
