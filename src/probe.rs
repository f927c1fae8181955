//! Locating the browser executable on the host.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::Error;

pub trait ExecutableProbe {
    fn locate_executable(&self) -> Result<PathBuf, Error>;
}

const SYSTEM_PATHS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/snap/bin/chromium",
];

const BINARY_NAMES: &[&str] = &["chromium", "google-chrome"];

pub const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

// ETXTBSY: the binary is still open for writing somewhere, usually a fresh install
const TEXT_FILE_BUSY: i32 = 26;

/// Finds a Chromium or Chrome binary.
///
/// Candidates, in order: the explicit path, well known system paths, any
/// `*chromium*` package under the nix store, then `PATH`. The first candidate
/// that is an executable file and answers `--version` with a Chrome or
/// Chromium banner wins. The version check weeds out snap stubs and broken
/// installs; it can be turned off with [`with_version_check`](Self::with_version_check).
#[derive(Debug, Clone)]
pub struct ChromiumProbe {
    explicit: Option<PathBuf>,
    system_paths: Vec<PathBuf>,
    nix_store: PathBuf,
    path_var: Option<OsString>,
    version_timeout: Option<Duration>,
}

impl ChromiumProbe {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            system_paths: SYSTEM_PATHS.iter().map(PathBuf::from).collect(),
            nix_store: PathBuf::from("/nix/store"),
            path_var: std::env::var_os("PATH"),
            version_timeout: Some(VERSION_CHECK_TIMEOUT),
        }
    }

    /// Runs `<candidate> --version` with this timeout before accepting a
    /// candidate. `None` accepts any executable file.
    pub fn with_version_check(mut self, timeout: Option<Duration>) -> Self {
        self.version_timeout = timeout;
        self
    }

    pub fn with_system_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.system_paths = paths;
        self
    }

    pub fn with_nix_store(mut self, root: impl Into<PathBuf>) -> Self {
        self.nix_store = root.into();
        self
    }

    pub fn with_path_var(mut self, path_var: Option<OsString>) -> Self {
        self.path_var = path_var;
        self
    }

    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        candidates.extend(self.explicit.clone());
        candidates.extend(self.system_paths.iter().cloned());

        match fs::read_dir(&self.nix_store) {
            Ok(entries) => {
                let mut packages: Vec<PathBuf> = entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| {
                        entry
                            .file_name()
                            .to_string_lossy()
                            .to_lowercase()
                            .contains("chromium")
                    })
                    .map(|entry| entry.path())
                    .collect();

                packages.sort();
                for package in packages {
                    for name in BINARY_NAMES {
                        candidates.push(package.join("bin").join(name));
                    }
                }
            }

            Err(err) => log::trace!("skipping {}: {}", self.nix_store.display(), err),
        }

        if let Some(path_var) = &self.path_var {
            for dir in std::env::split_paths(path_var) {
                for name in BINARY_NAMES {
                    candidates.push(dir.join(name));
                }
            }
        }

        candidates
    }
}

impl ExecutableProbe for ChromiumProbe {
    fn locate_executable(&self) -> Result<PathBuf, Error> {
        let candidates = self.candidates();

        for candidate in &candidates {
            if !is_executable(candidate) {
                continue;
            }

            if let Some(timeout) = self.version_timeout {
                if !reports_browser_version(candidate, timeout) {
                    log::info!("skipping {}: not a working browser", candidate.display());
                    continue;
                }
            }

            log::debug!("found browser executable at {}", candidate.display());
            return Ok(candidate.clone());
        }

        log::error!(
            "no browser executable among {} candidates; set CHROME_PATH",
            candidates.len()
        );

        Err(Error::NotFound(
            "no Chromium or Chrome executable found, set CHROME_PATH".into(),
        ))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn reports_browser_version(path: &Path, timeout: Duration) -> bool {
    let mut child = match spawn_version(path) {
        Ok(child) => child,
        Err(err) => {
            log::debug!("cannot run {}: {}", path.display(), err);
            return false;
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(20)),
            Ok(None) => {
                log::debug!("{} --version timed out after {:?}", path.display(), timeout);
                let _ = child.kill();
                let _ = child.wait();
                return false;
            }
            Err(err) => {
                log::debug!("waiting on {} --version failed: {}", path.display(), err);
                return false;
            }
        }
    }

    match child.wait_with_output() {
        Ok(output) if output.status.success() => {
            let banner = String::from_utf8_lossy(&output.stdout).to_lowercase();
            banner.contains("chromium") || banner.contains("chrome")
        }
        Ok(output) => {
            log::debug!("{} --version exited with {}", path.display(), output.status);
            false
        }
        Err(err) => {
            log::debug!("reading {} --version failed: {}", path.display(), err);
            false
        }
    }
}

fn spawn_version(path: &Path) -> io::Result<Child> {
    let mut attempts = 0;
    loop {
        let spawned = Command::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Err(err) if err.raw_os_error() == Some(TEXT_FILE_BUSY) && attempts < 5 => {
                attempts += 1;
                std::thread::sleep(Duration::from_millis(10));
            }
            spawned => return spawned,
        }
    }
}
