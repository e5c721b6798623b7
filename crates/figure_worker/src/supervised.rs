//! Starting the long-lived worker that sessions attach to.
//!
//! The supervised worker is a detached browser listening on a fixed remote
//! debugging port. It outlives the orchestrator, so restarting the
//! orchestrator only costs a new page instead of a cold browser start.

use anyhow::{Context as _, Result, anyhow};
use log::{info, warn};
use std::env;
use std::ffi::OsStr;
use std::fs::{File, create_dir_all, read_to_string};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::chrome::RENDER_FLAGS;
use crate::config::WorkerConfig;

/// Browser names looked up on `PATH`, most preferred first.
const BROWSER_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

/// Install locations that are usually not on `PATH`.
const INSTALL_PATHS: &[&str] = &[
    "/opt/google/chrome/chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

/// First browser binary found in the directories of `search_path`.
#[must_use]
pub fn find_browser_in(search_path: &OsStr) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = env::split_paths(search_path).collect();
    BROWSER_NAMES
        .iter()
        .flat_map(|name| dirs.iter().map(move |dir| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Locate a browser binary on `PATH` or in a standard install location.
///
/// # Errors
///
/// Returns an error if no browser is installed; set `CHROME_BIN` to point
/// at one explicitly.
pub fn find_chrome_executable() -> Result<PathBuf> {
    env::var_os("PATH")
        .and_then(|search_path| find_browser_in(&search_path))
        .or_else(|| {
            INSTALL_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.is_file())
        })
        .ok_or_else(|| anyhow!("no Chromium or Chrome binary found; set CHROME_BIN"))
}

/// Where the supervised worker's stderr goes.
#[must_use]
pub fn worker_log_path(config: &WorkerConfig) -> PathBuf {
    config.user_data_dir.join("worker.log")
}

fn log_tail(path: &Path) -> String {
    let text = read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(20)..].join("\n")
}

/// Whether something accepts connections on the local debugging port.
#[must_use]
pub fn is_worker_running(port: u16) -> bool {
    TcpStream::connect(format!("127.0.0.1:{port}")).is_ok()
}

/// Start a detached worker on the configured debugging port.
///
/// Returns the process id. If a worker is already listening, nothing is
/// started and `None` is returned.
///
/// # Errors
///
/// Returns an error if the browser cannot be found, exits during startup,
/// or does not open its port within the launch timeout.
pub async fn spawn_supervised_worker(config: &WorkerConfig) -> Result<Option<u32>> {
    if is_worker_running(config.port) {
        info!("[WORKER] supervised worker already listening on {}", config.port);
        return Ok(None);
    }

    let chrome_bin = match &config.chrome_executable {
        Some(path) => path.clone(),
        None => find_chrome_executable()?,
    };
    create_dir_all(&config.user_data_dir)?;

    let mut chrome_args = vec![
        format!("--remote-debugging-port={}", config.port),
        format!("--user-data-dir={}", config.user_data_dir.display()),
        "--headless=new".to_owned(),
        "--no-sandbox".to_owned(),
        "--no-first-run".to_owned(),
        "--no-default-browser-check".to_owned(),
        "--mute-audio".to_owned(),
        "--enable-automation".to_owned(),
    ];
    chrome_args.extend(RENDER_FLAGS.iter().map(|flag| (*flag).to_owned()));

    info!(
        "[WORKER] starting supervised worker: {} {:?}",
        chrome_bin.display(),
        chrome_args
    );
    // The worker outlives us, so its stderr goes to a file nobody has to drain.
    let log_path = worker_log_path(config);
    let log_file = File::create(&log_path)
        .with_context(|| format!("creating worker log {}", log_path.display()))?;
    let mut process = Command::new(&chrome_bin)
        .args(&chrome_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log_file))
        .spawn()
        .with_context(|| format!("starting worker {}", chrome_bin.display()))?;

    let start = Instant::now();
    while start.elapsed() < config.launch_timeout {
        if is_worker_running(config.port) {
            info!(
                "[WORKER] supervised worker {} ready on port {} after {:?}",
                process.id(),
                config.port,
                start.elapsed()
            );
            return Ok(Some(process.id()));
        }

        if let Ok(Some(status)) = process.try_wait() {
            return Err(anyhow!(
                "worker exited during startup with {status}; {}:\n{}",
                log_path.display(),
                log_tail(&log_path)
            ));
        }

        sleep(Duration::from_millis(100)).await;
    }

    warn!("[WORKER] supervised worker did not open port {}", config.port);
    let _ignore_result = process.kill();
    Err(anyhow!(
        "Chrome failed to start within {:?}",
        config.launch_timeout
    ))
}
