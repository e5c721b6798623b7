//! Worker process settings.

use core::time::Duration;
use std::env;
use std::path::PathBuf;

/// Default remote debugging port of the supervised worker.
pub const DEFAULT_WORKER_PORT: u16 = 19222;

/// How to reach, or launch, the browser worker.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Control endpoint of an externally supervised worker.
    pub endpoint: String,
    /// Remote debugging port used when starting a supervised worker.
    pub port: u16,
    /// Browser binary; discovered on `PATH` when unset.
    pub chrome_executable: Option<PathBuf>,
    /// Profile directory for the supervised worker.
    pub user_data_dir: PathBuf,
    /// How long to wait for a freshly started worker to accept connections.
    pub launch_timeout: Duration,
    /// Initial window size of an owned worker.
    pub window_size: (u32, u32),
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: format!("http://127.0.0.1:{DEFAULT_WORKER_PORT}"),
            port: DEFAULT_WORKER_PORT,
            chrome_executable: None,
            user_data_dir: env::temp_dir().join("figure-worker-profile"),
            launch_timeout: Duration::from_secs(10),
            window_size: (800, 600),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `FIGURE_WORKER_PORT`: remote debugging port (default: 19222)
    /// - `FIGURE_WORKER_ENDPOINT`: control endpoint (default: `http://127.0.0.1:<port>`)
    /// - `CHROME_BIN`: browser executable
    /// - `FIGURE_WORKER_DATA_DIR`: supervised worker profile directory
    /// - `FIGURE_WORKER_LAUNCH_TIMEOUT_MS`: startup wait (default: 10000)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let port = env::var("FIGURE_WORKER_PORT")
            .ok()
            .and_then(|val| val.parse::<u16>().ok())
            .unwrap_or(defaults.port);
        let endpoint = env::var("FIGURE_WORKER_ENDPOINT")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .unwrap_or_else(|| format!("http://127.0.0.1:{port}"));
        let chrome_executable = env::var("CHROME_BIN").ok().map(PathBuf::from);
        let user_data_dir = env::var("FIGURE_WORKER_DATA_DIR")
            .ok()
            .map_or(defaults.user_data_dir, PathBuf::from);
        let launch_timeout = env::var("FIGURE_WORKER_LAUNCH_TIMEOUT_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map_or(defaults.launch_timeout, Duration::from_millis);
        Self {
            endpoint,
            port,
            chrome_executable,
            user_data_dir,
            launch_timeout,
            window_size: defaults.window_size,
        }
    }
}
