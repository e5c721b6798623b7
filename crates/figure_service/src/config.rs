//! Orchestrator settings.

use core::time::Duration;
use figure_layout::AnalyzerConfig;
use figure_worker::WorkerConfig;
use std::env;
use std::path::PathBuf;

/// Default address the service listens on.
pub const DEFAULT_SERVICE_ADDR: &str = "127.0.0.1:7341";

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Address of the line-delimited JSON listener.
    pub bind_addr: String,
    /// Directory holding `<category>/<name>.svg` figure sources.
    pub figure_root: PathBuf,
    /// Shut down after this long without a job.
    pub idle_window: Duration,
    /// How often the idle supervisor looks at the activity clock.
    pub idle_check_interval: Duration,
    /// Size used for documents that declare none.
    pub default_size: (u32, u32),
    pub analyzer: AnalyzerConfig,
    pub worker: WorkerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_SERVICE_ADDR.to_owned(),
            figure_root: PathBuf::from("figures"),
            idle_window: Duration::from_secs(10 * 60),
            idle_check_interval: Duration::from_secs(60),
            default_size: (800, 600),
            analyzer: AnalyzerConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|val| val.trim().parse::<u64>().ok())
}

fn env_dimension(name: &str) -> Option<u32> {
    env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<u32>().ok())
        .filter(|dimension| *dimension > 0)
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `FIGURE_SERVICE_ADDR`: listen address (default: 127.0.0.1:7341)
    /// - `FIGURE_ROOT`: figure source directory (default: `figures`)
    /// - `FIGURE_IDLE_MINUTES`: idle shutdown window (default: 10)
    /// - `FIGURE_IDLE_CHECK_SECS`: idle check interval (default: 60)
    /// - `FIGURE_DEFAULT_WIDTH` / `FIGURE_DEFAULT_HEIGHT`: fallback size (default: 800x600)
    ///
    /// Analyzer and worker settings come from their own `from_env`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let bind_addr = env::var("FIGURE_SERVICE_ADDR")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .unwrap_or(defaults.bind_addr);
        let figure_root = env::var("FIGURE_ROOT")
            .ok()
            .map_or(defaults.figure_root, PathBuf::from);
        let idle_window = env_u64("FIGURE_IDLE_MINUTES")
            .map_or(defaults.idle_window, |minutes| {
                Duration::from_secs(minutes.saturating_mul(60))
            });
        let idle_check_interval = env_u64("FIGURE_IDLE_CHECK_SECS")
            .filter(|secs| *secs > 0)
            .map_or(defaults.idle_check_interval, Duration::from_secs);
        let default_size = (
            env_dimension("FIGURE_DEFAULT_WIDTH").unwrap_or(defaults.default_size.0),
            env_dimension("FIGURE_DEFAULT_HEIGHT").unwrap_or(defaults.default_size.1),
        );
        Self {
            bind_addr,
            figure_root,
            idle_window,
            idle_check_interval,
            default_size,
            analyzer: AnalyzerConfig::from_env(),
            worker: WorkerConfig::from_env(),
        }
    }
}
