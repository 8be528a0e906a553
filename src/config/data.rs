//! Data layer, framework and profiler configuration types.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Data layer configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Registered storage adapters. At least one is required.
    pub adapters: Vec<String>,
    /// Manager definitions by manager name.
    pub managers: BTreeMap<String, ManagerConfig>,
    /// Force request scoping on or off. When unset, scoping follows the
    /// profiler's enabled flag.
    pub request_scope: Option<bool>,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// One manager definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Adapter backing this manager. Must be listed in `adapters`.
    pub adapter: String,
    /// Document (model) names this manager serves.
    pub documents: Vec<String>,
}

/// Data layer logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logger component reference, e.g. `"@logger.default"`.
    pub logger: Option<String>,
}

/// Host framework configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Scope switches.
    pub scope: ScopeConfig,
    /// Registered logger component names.
    pub loggers: Vec<String>,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            scope: ScopeConfig::default(),
            loggers: vec!["default".to_string()],
        }
    }
}

/// Framework scope switches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Master switch for request scoping; unset means enabled.
    pub request: Option<ScopeFlag>,
}

/// A boolean switch that may also be written as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScopeFlag {
    Bool(bool),
    Text(String),
}

impl ScopeFlag {
    /// Strings enable the switch only when they read `true` (any case).
    pub fn enabled(&self) -> bool {
        match self {
            ScopeFlag::Bool(enabled) => *enabled,
            ScopeFlag::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        }
    }
}

/// Profiler (timing subsystem) configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Enable per-request timing spans.
    pub enabled: bool,
}
