use std::time::Duration;

use rubberduck::{Config, ConfigError};

use super::FIXTURES_PATH;

fn load(name: &str) -> Result<Config, ConfigError> {
    Config::from_file(format!("{FIXTURES_PATH}/configs/{name}"))
}

#[test]
fn test_load_valid_config() {
    let config = load("valid_full.toml").expect("Failed to load config");

    assert_eq!(config.pool_size, 3);
    assert_eq!(config.timeout(), Duration::from_millis(2500));
    assert_eq!(config.reclaim_grace(), Duration::from_millis(500));
    assert_eq!(config.max_jobs_per_worker, 50);
    assert!(config.policy.allows_module("statistics"));
    assert!(!config.policy.allows_module("random"));
    assert_eq!(config.policy.max_output, 4096);
}

#[test]
fn test_load_minimal_config() {
    let config = load("valid_minimal.toml").expect("Failed to load config");

    assert_eq!(config.pool_size, 1);
    assert_eq!(config.timeout(), Duration::from_secs(10));
    assert_eq!(config.policy, rubberduck::SandboxPolicy::default());
}

#[test]
fn test_load_invalid_zero_pool() {
    assert!(matches!(
        load("invalid_zero_pool.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_load_invalid_unknown_module() {
    match load("invalid_unknown_module.toml") {
        Err(ConfigError::UnknownModule(name)) => assert_eq!(name, "subprocess"),
        other => panic!("expected UnknownModule, got {other:?}"),
    }
}

#[test]
fn test_load_invalid_negative_grace() {
    assert!(matches!(
        load("invalid_negative_grace.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_load_invalid_syntax() {
    assert!(matches!(
        load("invalid_syntax.toml"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_load_missing_file() {
    assert!(load("does_not_exist.toml").is_err());
}
