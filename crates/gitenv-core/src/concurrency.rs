use crate::CoreError;
use fs2::FileExt;
use gitenv_store::{lock_path_for, TargetLayout};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long to wait for a lock, and when an abandoned one may be taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// A lock file whose holder stamp is older than this is removed and
    /// re-acquired. Advisory only: a slow but live holder loses its lock.
    pub stale_after: Option<Duration>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: None,
        }
    }
}

/// Exclusive advisory lock on a path, held through a sibling lock file.
/// Released on drop, on every exit path.
#[derive(Debug)]
pub struct DirLock {
    lock_file: File,
    path: PathBuf,
}

impl DirLock {
    /// Lock `scope` (a directory or symlink location) via its sibling
    /// `.gitenv-lock_<name>` file.
    pub fn acquire(scope: &Path, options: &LockOptions) -> Result<Self, CoreError> {
        Self::acquire_file(&lock_path_for(scope), options)
    }

    pub fn acquire_file(lock_path: &Path, options: &LockOptions) -> Result<Self, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        let mut reclaimed = false;
        loop {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(lock_path)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    let mut lock = Self {
                        lock_file: file,
                        path: lock_path.to_path_buf(),
                    };
                    lock.stamp();
                    debug!("acquired {}", lock_path.display());
                    return Ok(lock);
                }
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(e.into()),
            }

            if !reclaimed && is_stale(lock_path, options.stale_after) {
                warn!("reclaiming stale lock {}", lock_path.display());
                std::fs::remove_file(lock_path)?;
                reclaimed = true;
                continue;
            }

            let waited = started.elapsed();
            if waited >= options.timeout {
                return Err(CoreError::LockTimeout {
                    path: lock_path.to_path_buf(),
                    waited,
                });
            }
            std::thread::sleep(options.poll_interval.min(options.timeout - waited));
        }
    }

    pub fn try_acquire(scope: &Path) -> Result<Option<Self>, CoreError> {
        let options = LockOptions {
            timeout: Duration::ZERO,
            ..LockOptions::default()
        };
        match Self::acquire(scope, &options) {
            Ok(lock) => Ok(Some(lock)),
            Err(CoreError::LockTimeout { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Holder identity, for whoever finds the file later. Also refreshes mtime.
    fn stamp(&mut self) {
        let stamp = format!(
            "pid={}\nacquired={}\n",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        let written = self
            .lock_file
            .set_len(0)
            .and_then(|()| self.lock_file.write_all(stamp.as_bytes()));
        if let Err(e) = written {
            debug!("could not stamp {}: {e}", self.path.display());
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
        || e.kind() == std::io::ErrorKind::WouldBlock
}

fn is_stale(lock_path: &Path, stale_after: Option<Duration>) -> bool {
    let Some(threshold) = stale_after else {
        return false;
    };
    let age = std::fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
    age.is_some_and(|age| age >= threshold)
}

/// Lock each package reference in the shared cache. Locks are taken in
/// sorted order so concurrent callers cannot deadlock.
pub fn acquire_package_locks<'p>(
    layout: &TargetLayout,
    packages: impl IntoIterator<Item = &'p str>,
    options: &LockOptions,
) -> Result<Vec<DirLock>, CoreError> {
    let mut packages: Vec<&str> = packages.into_iter().collect();
    packages.sort_unstable();
    packages.dedup();
    packages
        .into_iter()
        .map(|pkg| DirLock::acquire_file(&layout.pkg_lock_file(pkg), options))
        .collect()
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, finishing current environment...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
