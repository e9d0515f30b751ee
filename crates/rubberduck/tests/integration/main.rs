//! Integration tests for rubberduck
//!
//! These drive the real `rubberduck-worker` binary through the worker pool.
//! Run with: cargo test -p rubberduck --test integration

use std::fs;
use std::path::PathBuf;

use rubberduck::Config;

mod config_loading;
mod pool;
mod scenarios;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// The worker binary built alongside these tests
pub(crate) fn worker_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rubberduck-worker"))
}

/// Helper to get fixture script content
pub(crate) fn fixture_script(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/scripts/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// A config pointing at the test worker, with short timings
pub(crate) fn test_config(pool_size: usize) -> Config {
    Config {
        worker_path: Some(worker_path()),
        pool_size,
        timeout: 5.0,
        reclaim_grace: 0.25,
        sweep_interval: 0.05,
        ..Config::default()
    }
}
