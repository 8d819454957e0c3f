//! Configuration management for the rsacl server.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use rsacl_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("config.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use rsacl_domain::{NamespaceRelations, RelationConfig};

/// Environment variable prefix.
const ENV_PREFIX: &str = "RSACL";

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Closure cache settings
    #[serde(default)]
    pub user_relations: UserRelationSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Nesting rules: namespace → relation → relations reachable through it.
    #[serde(default)]
    pub namespaces: HashMap<String, HashMap<String, Vec<String>>>,
}

/// Closure cache build settings.
///
/// Overridable with `RSACL_USER_RELATIONS__<FIELD>`, for example
/// `RSACL_USER_RELATIONS__ENABLED=false`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UserRelationSettings {
    /// Master switch for the closure cache.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Rebuild a user's closure when one of their tuples changes.
    #[serde(default = "default_true")]
    pub update_on_acl_change: bool,

    /// Period of the deferred-build tick in milliseconds.
    #[serde(default = "default_scheduled_period_ms")]
    pub scheduled_period_ms: u64,

    /// Page size for full rebuild listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Number of build worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for UserRelationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            update_on_acl_change: true,
            scheduled_period_ms: default_scheduled_period_ms(),
            page_size: default_page_size(),
            workers: default_workers(),
        }
    }
}

impl UserRelationSettings {
    /// Tick period as a duration.
    pub fn scheduled_period(&self) -> Duration {
        Duration::from_millis(self.scheduled_period_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_scheduled_period_ms() -> u64 {
    1000
}

fn default_page_size() -> u32 {
    100
}

fn default_workers() -> usize {
    2
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Log span enter and exit events
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `RSACL_` and use `__` as separator.
    /// For example `RSACL_USER_RELATIONS__PAGE_SIZE=50` overrides
    /// `user_relations.page_size`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let relations = &self.user_relations;
        if relations.page_size == 0 {
            return Err(invalid("user_relations.page_size must be greater than 0"));
        }
        if relations.scheduled_period_ms == 0 {
            return Err(invalid(
                "user_relations.scheduled_period_ms must be greater than 0",
            ));
        }
        if relations.workers == 0 {
            return Err(invalid("user_relations.workers must be greater than 0"));
        }

        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    valid_backends, self.storage.backend
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        for (namespace, rules) in &self.namespaces {
            for (relation, nested) in rules {
                if relation.is_empty() || nested.iter().any(String::is_empty) {
                    return Err(ConfigLoadError::Invalid {
                        message: format!("namespaces.{namespace} has an empty relation name"),
                    });
                }
            }
        }

        Ok(())
    }

    /// Builds the relation config described by `namespaces`.
    pub fn relation_config(&self) -> RelationConfig {
        RelationConfig::from_namespaces(self.namespaces.iter().map(|(namespace, rules)| {
            rules
                .iter()
                .fold(NamespaceRelations::new(namespace), |entry, (relation, nested)| {
                    entry.with_nested(relation, nested.iter().cloned())
                })
        }))
    }
}

fn environment() -> Environment {
    // RSACL_USER_RELATIONS__WORKERS -> user_relations.workers
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn invalid(message: &str) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Test: Can load config from YAML file
    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
user_relations:
  enabled: true
  update_on_acl_change: false
  scheduled_period_ms: 250
  page_size: 20
  workers: 4

storage:
  backend: memory

logging:
  level: debug
  json: true
  spans: true

namespaces:
  doc:
    member: [viewer, editor]
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();

        assert!(config.user_relations.enabled);
        assert!(!config.user_relations.update_on_acl_change);
        assert_eq!(
            config.user_relations.scheduled_period(),
            Duration::from_millis(250)
        );
        assert_eq!(config.user_relations.page_size, 20);
        assert_eq!(config.user_relations.workers, 4);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert!(config.logging.spans);

        let table = config.relation_config().snapshot();
        let nested = table.nested_relations("doc", "member").unwrap();
        assert!(nested.contains("viewer"));
        assert!(nested.contains("editor"));
    }

    /// Test: Can override config with env vars
    #[test]
    #[serial]
    fn test_can_override_config_with_env_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
user_relations:
  page_size: 10
  workers: 1
"#
        )
        .unwrap();

        std::env::set_var("RSACL_USER_RELATIONS__WORKERS", "8");
        std::env::set_var("RSACL_LOGGING__LEVEL", "warn");

        let config = ServerConfig::load(file.path());

        std::env::remove_var("RSACL_USER_RELATIONS__WORKERS");
        std::env::remove_var("RSACL_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.user_relations.workers, 8); // Overridden by env
        assert_eq!(config.user_relations.page_size, 10); // From file
        assert_eq!(config.logging.level, "warn"); // Overridden by env
    }

    /// Test: Config validation catches errors
    #[test]
    fn test_config_validation_catches_errors() {
        let cases: [(fn(&mut ServerConfig), &str); 6] = [
            (|c| c.user_relations.page_size = 0, "page_size"),
            (|c| c.user_relations.scheduled_period_ms = 0, "scheduled_period_ms"),
            (|c| c.user_relations.workers = 0, "workers"),
            (|c| c.storage.backend = "postgres".to_string(), "storage.backend"),
            (|c| c.logging.level = "loud".to_string(), "logging.level"),
            (
                |c| {
                    c.namespaces.insert(
                        "doc".to_string(),
                        HashMap::from([("member".to_string(), vec![String::new()])]),
                    );
                },
                "namespaces.doc",
            ),
        ];

        for (mutate, field) in cases {
            let mut config = ServerConfig::default();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(field),
                "error for '{field}' should name it, got: {err}"
            );
        }
    }

    /// Test: Invalid config returns clear error
    #[test]
    fn test_invalid_config_returns_clear_error() {
        let result = ServerConfig::load("/nonexistent/path/config.yaml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("not found"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: syntax: [").unwrap();

        let result = ServerConfig::load(file.path());
        assert!(matches!(result, Err(ConfigLoadError::Load(_))));
    }

    /// Test: Default config is valid
    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        assert!(config.user_relations.enabled);
        assert!(config.user_relations.update_on_acl_change);
        assert_eq!(config.user_relations.scheduled_period_ms, 1000);
        assert_eq!(config.user_relations.page_size, 100);
        assert_eq!(config.user_relations.workers, 2);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.logging.level, "info");
        assert!(config.relation_config().snapshot().is_empty());
    }

    /// Test: from_env loads defaults with env overrides
    #[test]
    #[serial]
    fn test_from_env_loads_defaults_with_env_overrides() {
        std::env::set_var("RSACL_USER_RELATIONS__ENABLED", "false");

        let config = ServerConfig::from_env();

        std::env::remove_var("RSACL_USER_RELATIONS__ENABLED");

        let config = config.unwrap();
        assert!(!config.user_relations.enabled);
        assert_eq!(config.user_relations.page_size, 100); // default
    }
}
