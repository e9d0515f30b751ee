use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::policy::{DEFAULT_MODULES, SandboxPolicy};

mod loader;
pub mod policy;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../rubberduck.example.toml");

/// Name of the worker binary shipped with this crate.
pub const WORKER_BINARY: &str = "rubberduck-worker";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("module '{0}' is not provided by the sandbox")]
    UnknownModule(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Rubberduck
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the worker binary (see [`Config::worker_binary`]).
    #[serde(default)]
    pub worker_path: Option<PathBuf>,

    /// Number of worker processes in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Seconds a caller waits for a result before reporting a timeout.
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Seconds a worker may overrun `timeout` before it is killed and replaced.
    #[serde(default = "default_reclaim_grace")]
    pub reclaim_grace: f64,

    /// Seconds between supervisor sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: f64,

    /// Jobs a worker runs before it is retired.
    #[serde(default = "default_max_jobs_per_worker")]
    pub max_jobs_per_worker: u32,

    /// What scripts are allowed to reach inside a worker.
    #[serde(default)]
    pub policy: SandboxPolicy,
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the path to the worker binary
    ///
    /// Prefers an explicit `worker_path`, then a `rubberduck-worker` sitting
    /// next to the current executable, then a bare name resolved through PATH.
    pub fn worker_binary(&self) -> PathBuf {
        if let Some(ref path) = self.worker_path {
            return path.clone();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BINARY)))
            .filter(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(WORKER_BINARY))
    }

    /// Default bound on a caller's wait
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout)
    }

    pub fn reclaim_grace(&self) -> Duration {
        seconds(self.reclaim_grace)
    }

    pub fn sweep_interval(&self) -> Duration {
        seconds(self.sweep_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

/// Saturating conversion for values that skipped [`Config::validate`]
fn seconds(value: f64) -> Duration {
    if value.is_nan() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn default_pool_size() -> usize {
    4
}

fn default_timeout() -> f64 {
    10.0
}

fn default_reclaim_grace() -> f64 {
    1.0
}

fn default_sweep_interval() -> f64 {
    0.25
}

fn default_max_jobs_per_worker() -> u32 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = Config::default();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.max_jobs_per_worker, 500);
        assert_eq!(config.policy.allowed_modules, DEFAULT_MODULES);
    }

    #[test]
    fn worker_binary_custom_path() {
        let config = Config {
            worker_path: Some(PathBuf::from("/opt/duck/worker")),
            ..Config::default()
        };
        assert_eq!(config.worker_binary(), PathBuf::from("/opt/duck/worker"));
    }

    #[test]
    fn worker_binary_falls_back_to_name() {
        let config = Config::default();
        let binary = config.worker_binary();
        assert!(binary.ends_with(WORKER_BINARY));
    }

    #[test]
    fn durations_convert_from_seconds() {
        let config = Config {
            timeout: 2.5,
            reclaim_grace: 0.5,
            sweep_interval: 0.1,
            ..Config::default()
        };
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.reclaim_grace(), Duration::from_millis(500));
        assert_eq!(config.sweep_interval(), Duration::from_millis(100));
    }
}
