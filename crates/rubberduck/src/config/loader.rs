//! Configuration file loading for Rubberduck
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};
use crate::sandbox::modules;

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "pool_size must be at least 1".to_owned(),
            ));
        }

        for (key, seconds) in [
            ("timeout", self.timeout),
            ("reclaim_grace", self.reclaim_grace),
            ("sweep_interval", self.sweep_interval),
        ] {
            if seconds < 0.0 || Duration::try_from_secs_f64(seconds).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be a non-negative number of seconds, got {seconds}"
                )));
            }
        }
        if self.timeout == 0.0 || self.sweep_interval == 0.0 {
            return Err(ConfigError::Invalid(
                "timeout and sweep_interval must be greater than zero".to_owned(),
            ));
        }

        if self.max_jobs_per_worker == 0 {
            return Err(ConfigError::Invalid(
                "max_jobs_per_worker must be at least 1".to_owned(),
            ));
        }

        let policy = &self.policy;
        if policy.max_recursion == 0 {
            return Err(ConfigError::Invalid(
                "policy.max_recursion must be at least 1".to_owned(),
            ));
        }
        for module in &policy.allowed_modules {
            if !modules::is_known(module) {
                return Err(ConfigError::UnknownModule(module.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse_toml("pool_size = 2").unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.timeout, 10.0);
        assert!(config.policy.allows_module("math"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
worker_path = "/usr/local/bin/rubberduck-worker"
pool_size = 8
timeout = 3.5
reclaim_grace = 0.5
sweep_interval = 0.1
max_jobs_per_worker = 10

[policy]
allowed_modules = ["math"]
max_output = 1024
max_recursion = 50
max_sequence = 5000
"#;

        let config = Config::parse_toml(toml).unwrap();
        assert_eq!(
            config.worker_path,
            Some(std::path::PathBuf::from("/usr/local/bin/rubberduck-worker"))
        );
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.timeout, 3.5);
        assert_eq!(config.max_jobs_per_worker, 10);
        assert_eq!(config.policy.allowed_modules, vec!["math".to_owned()]);
        assert_eq!(config.policy.max_output, 1024);
        assert_eq!(config.policy.max_recursion, 50);
        assert_eq!(config.policy.max_sequence, 5000);
    }

    #[test]
    fn test_partial_policy_keeps_other_defaults() {
        let toml = r#"
[policy]
max_output = 10
"#;
        let config = Config::parse_toml(toml).unwrap();
        assert_eq!(config.policy.max_output, 10);
        assert_eq!(config.policy.max_recursion, 200);
        assert_eq!(config.policy.allowed_modules.len(), 4);
    }

    #[test]
    fn test_invalid_zero_pool() {
        let result = Config::parse_toml("pool_size = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_negative_timeout() {
        let result = Config::parse_toml("timeout = -1.0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_zero_timeout() {
        let result = Config::parse_toml("timeout = 0.0");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_module_rejected() {
        let toml = r#"
[policy]
allowed_modules = ["math", "os"]
"#;
        match Config::parse_toml(toml) {
            Err(ConfigError::UnknownModule(name)) => assert_eq!(name, "os"),
            other => panic!("expected UnknownModule, got {other:?}"),
        }
    }

    #[test]
    fn test_embedded_example_is_valid() {
        let config = Config::parse_toml(crate::config::EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.pool_size, 4);
    }

    #[test]
    fn test_invalid_huge_timeout() {
        let result = Config::parse_toml("timeout = 1e300");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        let result = Config::parse_toml("reclaim_grace = 1e300");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unvalidated_durations_saturate() {
        let config = Config {
            timeout: 1e300,
            reclaim_grace: f64::NAN,
            ..Config::default()
        };
        assert_eq!(config.timeout(), std::time::Duration::MAX);
        assert_eq!(config.reclaim_grace(), std::time::Duration::ZERO);
    }
}
