use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("invalid executor max_concurrent_assets: {0}. Must be at least 1")]
    InvalidMaxConcurrentAssets(usize),

    #[error("invalid executor default_max_failure_fraction: {0}. Must be in [0, 1]")]
    InvalidMaxFailureFraction(f64),

    #[error("invalid llm max_retries: {0}")]
    InvalidLlmMaxRetries(u32),

    #[error("invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})")]
    InvalidBackoff(u64, u64),

    #[error("durability mode is `durable` but no remote_endpoint was configured")]
    MissingRemoteEndpoint,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (`Config::default`)
    /// 2. `.fleetctl/config.yaml` (project config)
    /// 3. `.fleetctl/local.yaml` (project-local overrides, optional)
    /// 4. Environment variables (`FLEETCTL_*` prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".fleetctl/config.yaml"))
            .merge(Yaml::file(".fleetctl/local.yaml"))
            .merge(Env::prefixed("FLEETCTL_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, skipping the project-local layers.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("FLEETCTL_").split("__"))
            .extract()
            .context(format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.executor.max_concurrent_assets == 0 {
            return Err(ConfigError::InvalidMaxConcurrentAssets(config.executor.max_concurrent_assets));
        }

        if !(0.0..=1.0).contains(&config.executor.default_max_failure_fraction) {
            return Err(ConfigError::InvalidMaxFailureFraction(config.executor.default_max_failure_fraction));
        }

        if config.llm.max_retries == 0 {
            return Err(ConfigError::InvalidLlmMaxRetries(0));
        }

        if config.llm.initial_backoff_ms >= config.llm.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(config.llm.initial_backoff_ms, config.llm.max_backoff_ms));
        }

        if config.durability.mode == crate::domain::models::config::DurabilityMode::Durable
            && config.durability.remote_endpoint.is_none()
        {
            return Err(ConfigError::MissingRemoteEndpoint);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn rejects_zero_max_concurrent_assets() {
        let mut config = Config::default();
        config.executor.max_concurrent_assets = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxConcurrentAssets(0))));
    }

    #[test]
    fn rejects_out_of_range_failure_fraction() {
        let mut config = Config::default();
        config.executor.default_max_failure_fraction = 1.5;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxFailureFraction(_))));
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let mut config = Config::default();
        config.llm.initial_backoff_ms = 30_000;
        config.llm.max_backoff_ms = 10_000;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidBackoff(30_000, 10_000))));
    }

    #[test]
    fn durable_mode_requires_remote_endpoint() {
        let mut config = Config::default();
        config.durability.mode = crate::domain::models::config::DurabilityMode::Durable;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::MissingRemoteEndpoint)));
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = r"
logging:
  level: debug
  format: pretty
executor:
  max_concurrent_assets: 5
";
        let config: Config = figment::Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(figment::providers::Yaml::string(yaml))
            .extract()
            .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.executor.max_concurrent_assets, 5);
        ConfigLoader::validate(&config).unwrap();
    }
}
