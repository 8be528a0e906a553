//! Application configuration.
//!
//! Aggregates data layer, framework and profiler settings into a single
//! Config struct that can be loaded from YAML files or environment variables.

mod data;

pub use data::{
    DataConfig, FrameworkConfig, LoggingConfig, ManagerConfig, ProfilerConfig, ScopeConfig,
    ScopeFlag,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "DATA_SCOPE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "DATA_SCOPE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "DATA_SCOPE_LOG";
/// Prefix of component references in configuration values.
pub const COMPONENT_REF_PREFIX: char = '@';
/// Namespace of logger components.
pub const LOGGER_NAMESPACE: &str = "logger.";

use serde::Deserialize;

/// Configuration errors. All of them are fatal at boot.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No data adapters configured")]
    NoAdapters,

    #[error("Manager {manager} references unregistered adapter {adapter}")]
    UnknownAdapter { manager: String, adapter: String },

    #[error("Unregistered component: {0}")]
    UnknownComponent(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data layer configuration.
    pub data: DataConfig,
    /// Host framework configuration.
    pub framework: FrameworkConfig,
    /// Timing subsystem configuration.
    pub profiler: ProfilerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Config with one adapter and one manager, for tests.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.data.adapters = vec!["memory".to_string()];
        config.data.managers.insert(
            "default".to_string(),
            ManagerConfig {
                adapter: "memory".to_string(),
                documents: vec!["Doc".to_string()],
            },
        );
        config
    }

    /// Check the configuration is complete enough to boot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.adapters.is_empty() {
            return Err(ConfigError::NoAdapters);
        }

        for (name, manager) in &self.data.managers {
            if !self.data.adapters.contains(&manager.adapter) {
                return Err(ConfigError::UnknownAdapter {
                    manager: name.clone(),
                    adapter: manager.adapter.clone(),
                });
            }
        }

        self.logger()?;
        Ok(())
    }

    /// Resolve the data layer's logger reference to a registered logger.
    ///
    /// Returns `None` when no logger is referenced.
    pub fn logger(&self) -> Result<Option<&str>, ConfigError> {
        let Some(reference) = self.data.logging.logger.as_deref() else {
            return Ok(None);
        };

        reference
            .strip_prefix(COMPONENT_REF_PREFIX)
            .and_then(|component| component.strip_prefix(LOGGER_NAMESPACE))
            .filter(|name| self.framework.loggers.iter().any(|l| l.as_str() == *name))
            .map(Some)
            .ok_or_else(|| ConfigError::UnknownComponent(reference.to_string()))
    }

    /// Whether requests get their own proxy tree.
    ///
    /// The framework switch must not be off, and either the data layer asks
    /// for request scoping explicitly or leaves it unset while the profiler
    /// is enabled.
    pub fn request_scope_enabled(&self) -> bool {
        let framework = self
            .framework
            .scope
            .request
            .as_ref()
            .map_or(true, ScopeFlag::enabled);

        framework && self.data.request_scope.unwrap_or(self.profiler.enabled)
    }
}
