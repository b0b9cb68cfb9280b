//! Configuration loading and resolution
//!
//! Configuration comes from a small TOML file. Every key is optional; missing
//! keys fall back to compiled defaults.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables (`TORO_PLAY_DELAY_MS`, `TORO_LOG_LEVEL`)
//! 3. TOML configuration file (explicit path, `TORO_CONFIG`, or platform default)
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG_PATH: &str = "TORO_CONFIG";
/// Environment variable overriding `dispatcher.delay_ms`
pub const ENV_PLAY_DELAY_MS: &str = "TORO_PLAY_DELAY_MS";
/// Environment variable overriding `logging.level`
pub const ENV_LOG_LEVEL: &str = "TORO_LOG_LEVEL";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TomlConfig {
    #[serde(default)]
    pub manager: ManagerSettings,

    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Player manager settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ManagerSettings {
    /// Events buffered per subscriber before it starts lagging
    ///
    /// Default: 256
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
        }
    }
}

/// Settings for the built-in fixed delay dispatcher
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DispatcherSettings {
    /// Delay before a player starts, in milliseconds
    ///
    /// `-1` never plays, `0` plays immediately.
    /// Default: 0
    #[serde(default)]
    pub delay_ms: i64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self { delay_ms: 0 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_event_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded TOML configuration from {:?}", path);
        Ok(config)
    }

    /// Reject values that can never be valid at runtime
    pub fn validate(&self) -> Result<()> {
        if self.manager.event_capacity == 0 {
            return Err(Error::Config(
                "manager.event_capacity must be greater than zero".to_string(),
            ));
        }
        if self.dispatcher.delay_ms < -1 {
            return Err(Error::Config(format!(
                "dispatcher.delay_ms must be -1, 0 or positive (got {})",
                self.dispatcher.delay_ms
            )));
        }
        Ok(())
    }

    /// Apply `TORO_PLAY_DELAY_MS` and `TORO_LOG_LEVEL` on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(ENV_PLAY_DELAY_MS) {
            self.dispatcher.delay_ms = raw.trim().parse::<i64>().map_err(|e| {
                Error::InvalidInput(format!("{}={:?}: {}", ENV_PLAY_DELAY_MS, raw, e))
            })?;
            debug!("dispatcher.delay_ms overridden from environment: {}", self.dispatcher.delay_ms);
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.logging.level = level.trim().to_string();
            }
        }
        self.validate()
    }
}

/// Locates and loads the configuration file
pub struct ConfigResolver {
    app_name: String,
}

impl ConfigResolver {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }

    /// Platform default config path: `<config_dir>/<app>/config.toml`
    pub fn default_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(&self.app_name).join("config.toml"))
    }

    /// Resolve the effective configuration
    ///
    /// An explicitly named file (argument or `TORO_CONFIG`) must exist and
    /// parse. The platform default file is optional: if it is missing the
    /// compiled defaults are used with a warning.
    pub fn resolve(&self, explicit: Option<&Path>) -> Result<TomlConfig> {
        let env_path = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);

        let mut config = if let Some(path) = explicit {
            TomlConfig::load(path)?
        } else if let Some(path) = env_path {
            TomlConfig::load(&path)?
        } else {
            match self.default_config_path() {
                Some(path) if path.exists() => TomlConfig::load(&path)?,
                Some(path) => {
                    warn!("No config file at {:?}, using built-in defaults", path);
                    TomlConfig::default()
                }
                None => {
                    warn!("Could not determine config directory, using built-in defaults");
                    TomlConfig::default()
                }
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }
}
