//! Client settings.

use core::time::Duration;
use figure_service::config::DEFAULT_SERVICE_ADDR;
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub service_addr: String,
    /// Jobs slower than this are logged but still succeed.
    pub soft_timeout: Duration,
    /// Jobs slower than this are abandoned and the service restarted.
    pub hard_timeout: Duration,
    /// Append-only JSON-lines record of slow and hung jobs.
    pub hang_log: PathBuf,
    /// Executable started when the service must be restarted.
    pub service_bin: PathBuf,
    /// How long a restarted service gets to accept connections.
    pub restart_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_addr: DEFAULT_SERVICE_ADDR.to_owned(),
            soft_timeout: Duration::from_secs(5),
            hard_timeout: Duration::from_secs(30),
            hang_log: PathBuf::from("figure-hangs.jsonl"),
            service_bin: PathBuf::from("figure-service"),
            restart_timeout: Duration::from_secs(15),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `FIGURE_SERVICE_ADDR`: service address (default: 127.0.0.1:7341)
    /// - `FIGURE_SOFT_TIMEOUT_MS`: slow-job threshold (default: 5000)
    /// - `FIGURE_HARD_TIMEOUT_MS`: hung-job threshold (default: 30000)
    /// - `FIGURE_HANG_LOG`: hang record file (default: `figure-hangs.jsonl`)
    /// - `FIGURE_SERVICE_BIN`: service executable (default: `figure-service`)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |name: &str| {
            env::var(name)
                .ok()
                .and_then(|val| val.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
                .map(Duration::from_millis)
        };
        let soft_timeout = millis("FIGURE_SOFT_TIMEOUT_MS").unwrap_or(defaults.soft_timeout);
        let hard_timeout = millis("FIGURE_HARD_TIMEOUT_MS")
            .unwrap_or(defaults.hard_timeout)
            .max(soft_timeout);
        Self {
            service_addr: env::var("FIGURE_SERVICE_ADDR")
                .ok()
                .filter(|val| !val.trim().is_empty())
                .unwrap_or(defaults.service_addr),
            soft_timeout,
            hard_timeout,
            hang_log: env::var("FIGURE_HANG_LOG")
                .ok()
                .map_or(defaults.hang_log, PathBuf::from),
            service_bin: env::var("FIGURE_SERVICE_BIN")
                .ok()
                .map_or(defaults.service_bin, PathBuf::from),
            restart_timeout: defaults.restart_timeout,
        }
    }
}
