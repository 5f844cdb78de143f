use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::{Config, QueueThreshold};

/// Project directory holding the config files and the default database.
pub const PROJECT_DIR: &str = ".convoy";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid sample_window: {0}. Must be at least 1")]
    InvalidSampleWindow(usize),

    #[error("Invalid {0} threshold: wait limit must not be negative")]
    InvalidThreshold(&'static str),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .convoy/config.yaml (project config, created by init)
    /// 3. .convoy/local.yaml (local overrides, optional)
    /// 4. Environment variables (CONVOY_* prefix, `__` separates nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CONVOY_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(format!("{PROJECT_DIR}/config.yaml")))
            .merge(Yaml::file(format!("{PROJECT_DIR}/local.yaml")))
            .merge(Env::prefixed("CONVOY_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.monitor.sample_window == 0 {
            return Err(ConfigError::InvalidSampleWindow(config.monitor.sample_window));
        }

        if config.monitor.default_estimate_secs <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "monitor.default_estimate_secs must be positive".to_string(),
            ));
        }

        let thresholds = &config.monitor.thresholds;
        let tiers: [(&'static str, Option<&QueueThreshold>); 3] = [
            ("critical", thresholds.critical.as_ref()),
            ("high", Some(&thresholds.high)),
            ("medium", Some(&thresholds.medium)),
        ];
        for (name, tier) in tiers {
            if tier.is_some_and(|t| t.min_avg_wait_secs < 0.0) {
                return Err(ConfigError::InvalidThreshold(name));
            }
        }

        if config.bus.default_task_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "bus.default_task_timeout_secs must be at least 1".to_string(),
            ));
        }

        if config.bus.visibility_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "bus.visibility_timeout_secs must be at least 1 when set".to_string(),
            ));
        }

        if config.orchestrator.scan_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "orchestrator.scan_interval_secs must be at least 1".to_string(),
            ));
        }

        if config.orchestrator.wait_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "orchestrator.wait_poll_interval_ms must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// YAML for a fresh project config, as written by `convoy init`.
    pub fn default_yaml() -> Result<String> {
        serde_yaml::to_string(&Config::default()).context("Failed to serialize default config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".convoy/convoy.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.monitor.sample_window, 1000);
        assert_eq!(config.orchestrator.scan_interval_secs, 30);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 3
logging:
  level: debug
  format: pretty
bus:
  visibility_timeout_secs: 120
monitor:
  sample_window: 50
  thresholds:
    critical:
      min_queue_depth: 20
      min_avg_wait_secs: 900.0
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.bus.visibility_timeout_secs, Some(120));
        assert_eq!(config.monitor.sample_window, 50);
        assert_eq!(
            config.monitor.thresholds.critical,
            Some(QueueThreshold::new(20, 900.0))
        );
        // Unspecified tiers keep their defaults
        assert_eq!(config.monitor.thresholds.high, QueueThreshold::new(5, 300.0));

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_default_yaml_round_trips() {
        let yaml = ConfigLoader::default_yaml().unwrap();
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        ConfigLoader::validate(&config).unwrap();
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_invalid_rotation() {
        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRotation(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_validate_zero_max_connections() {
        let mut config = Config::default();
        config.database.max_connections = 0;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConnections(0))
        ));
    }

    #[test]
    fn test_validate_zero_sample_window() {
        let mut config = Config::default();
        config.monitor.sample_window = 0;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidSampleWindow(0))
        ));
    }

    #[test]
    fn test_validate_negative_threshold() {
        let mut config = Config::default();
        config.monitor.thresholds.medium = QueueThreshold::new(3, -1.0);

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidThreshold("medium"))
        ));
    }

    #[test]
    fn test_validate_zero_visibility_timeout() {
        let mut config = Config::default();
        config.bus.visibility_timeout_secs = Some(0);

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_env_override() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: info\n  format: json").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("CONVOY_LOGGING__LEVEL", Some("debug")),
                ("CONVOY_ORCHESTRATOR__SCAN_INTERVAL_SECS", Some("5")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert_eq!(config.logging.level, "debug");
                assert_eq!(config.logging.format, "json");
                assert_eq!(config.orchestrator.scan_interval_secs, 5);
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "monitor:\n  sample_window: 200\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "monitor:\n  sample_window: 300\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.monitor.sample_window, 300, "Override should win");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
        assert_eq!(config.monitor.default_estimate_secs, 60.0);
    }
}
