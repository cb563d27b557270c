pub mod autolabel;
pub mod autotag;
pub mod completions;
pub mod deploy;
pub mod resolve;

use gitenv_core::CoreError;
use gitenv_repo::GitRepo;
use gitenv_runtime::{select_backend, PackageBackend};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::debug;

use crate::config::Config;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INPUT_ERROR: u8 = 2;
pub const EXIT_RETRYABLE: u8 = 3;

/// Message prefixes `main` maps to exit codes.
pub const INPUT_ERROR_PREFIX: &str = "input error:";
pub const RETRYABLE_PREFIX: &str = "retryable:";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn core_err(e: &CoreError) -> String {
    if e.is_retryable() {
        format!("{RETRYABLE_PREFIX} {e}")
    } else if e.is_input_error() {
        format!("{INPUT_ERROR_PREFIX} {e}")
    } else {
        e.to_string()
    }
}

/// Exit code for a batch whose individual failures were already reported.
pub fn batch_exit_code(failures: &[(String, CoreError)]) -> u8 {
    if failures.is_empty() {
        EXIT_SUCCESS
    } else if failures.iter().all(|(_, e)| e.is_retryable()) {
        EXIT_RETRYABLE
    } else {
        EXIT_FAILURE
    }
}

pub fn report_failures(failures: &[(String, CoreError)]) {
    for (what, e) in failures {
        eprintln!("warning: {what}: {e}");
    }
}

pub fn make_backend(config: &Config) -> Result<Box<dyn PackageBackend>, String> {
    let backend = select_backend(config.backend_name(), &config.backend_options())
        .map_err(|e| e.to_string())?;
    if !backend.available() {
        return Err(format!(
            "backend '{}' is not available on this system",
            backend.name()
        ));
    }
    Ok(backend)
}

/// A private clone of the tracking repository, removed on drop.
pub struct Checkout {
    pub repo: GitRepo,
    _dir: tempfile::TempDir,
}

impl Checkout {
    /// Clone `uri`, fetch every remote and track every remote branch.
    pub fn clone(uri: &str) -> Result<Self, String> {
        let dir = tempfile::Builder::new()
            .prefix("gitenv-")
            .tempdir()
            .map_err(|e| format!("failed to create clone directory: {e}"))?;
        let repo = GitRepo::clone_bare(uri, &dir.path().join("repo.git"))
            .map_err(|e| format!("failed to clone {uri}: {e}"))?;
        repo.fetch_all().map_err(|e| format!("failed to fetch {uri}: {e}"))?;
        let tracked = repo
            .create_tracking_branches()
            .map_err(|e| format!("failed to track branches of {uri}: {e}"))?;
        debug!("tracking {} remote branches", tracked.len());
        Ok(Self { repo, _dir: dir })
    }
}

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        spinner_style("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(spinner_style("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(spinner_style("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Optional spinner: none in JSON mode.
pub fn progress(json: bool, msg: &str) -> Option<ProgressBar> {
    (!json).then(|| spinner(msg))
}

pub fn finish(pb: Option<&ProgressBar>, ok: bool, msg: &str) {
    if let Some(pb) = pb {
        if ok {
            spin_ok(pb, msg);
        } else {
            spin_fail(pb, msg);
        }
    }
}

pub fn highlight(text: &str) -> String {
    console::Style::new().cyan().apply_to(text).to_string()
}
