use gitenv_core::LockOptions;
use gitenv_runtime::{BackendOptions, Credentials};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "GITENV_CONFIG";
pub const DEFAULT_BACKEND: &str = "conda";

/// `~/.config/gitenv/config.toml`, overridable per flag on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: Option<String>,
    pub conda: Option<String>,
    pub api_user: Option<String>,
    pub api_key: Option<String>,
    pub mirror: Option<String>,
    pub locks: LockConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    pub timeout_secs: u64,
    pub poll_millis: u64,
    pub stale_after_secs: Option<u64>,
}

impl Default for LockConfig {
    fn default() -> Self {
        let defaults = LockOptions::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            poll_millis: defaults.poll_interval.as_millis() as u64,
            stale_after_secs: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
        toml::from_str(&content).map_err(|e| format!("invalid config {}: {e}", path.display()))
    }

    /// `explicit`, else `$GITENV_CONFIG`, else the default path if it exists,
    /// else built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, String> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::load(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.as_deref().unwrap_or(DEFAULT_BACKEND)
    }

    pub fn backend_options(&self) -> BackendOptions {
        match &self.conda {
            Some(exe) => BackendOptions {
                conda_exe: exe.clone(),
            },
            None => BackendOptions::default(),
        }
    }

    /// Command-line credentials win over the file, each half on its own.
    pub fn override_credentials(&mut self, user: Option<String>, key: Option<String>) {
        if user.is_some() {
            self.api_user = user;
        }
        if key.is_some() {
            self.api_key = key;
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.api_user.clone(), self.api_key.clone())
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_secs(self.locks.timeout_secs),
            poll_interval: Duration::from_millis(self.locks.poll_millis.max(1)),
            stale_after: self.locks.stale_after_secs.map(Duration::from_secs),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/gitenv/config.toml"))
}
