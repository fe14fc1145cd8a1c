//! Configuration file parsing and structures.
//!
//! kumod reads a single TOML file. Only the `[kumo]` credentials are
//! required; every other section has defaults.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub kumo: KumoConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"kumod::kumo" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter for this configuration.
    pub fn targets(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

fn default_base_url() -> String {
    "https://geo-c.kumocloud.com".to_string()
}

fn default_app_version() -> String {
    "2.2.0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Kumo Cloud account
#[derive(Clone, Deserialize)]
pub struct KumoConfig {
    pub username: String,
    pub password: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// App version reported on login
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Bound on each cloud call (login, directory fetch)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl KumoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for KumoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KumoConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("app_version", &self.app_version)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_platform_name() -> String {
    "Kumo".to_string()
}

fn default_plugin_name() -> String {
    "homebridge-kumo".to_string()
}

/// How the platform presents itself to the host
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Platform identifier passed on registration
    #[serde(default = "default_platform_name")]
    pub name: String,

    /// Plugin identifier passed on registration
    #[serde(default = "default_plugin_name")]
    pub plugin: String,

    /// Unregister cached accessories whose device is no longer in the
    /// directory. Off by default: a flaky directory must not wipe accessories.
    #[serde(default)]
    pub remove_stale: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: default_platform_name(),
            plugin: default_plugin_name(),
            remove_stale: false,
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("accessories.json")
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Accessory store file
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        contents.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
