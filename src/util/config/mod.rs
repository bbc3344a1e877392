//! twinbridge configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments (--config FILE, --verbose)
//! 2. Environment variables (TWINBRIDGE_LOG)
//! 3. Project-level (./twinbridge.ron)
//! 4. User-level (~/.config/twinbridge/config.ron)
//! 5. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use twinbridge::util::config::BridgeConfig;
//!
//! let config = BridgeConfig::load(None).unwrap();
//! assert_eq!(config.command_name, "guest");
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bridge::marshal::DEFAULT_MAX_DEPTH;
use crate::util::logger::LogLevel;

/// Project-level config file name
pub const PROJECT_CONFIG_FILE: &str = "twinbridge.ron";

/// Environment variable overriding the log level
pub const LOG_ENV: &str = "TWINBRIDGE_LOG";

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name of the bridge command in the command runtime
    pub command_name: String,
    /// Name of the callback module in the object runtime
    pub callback_module: String,
    /// Nesting bound for value conversion
    pub max_depth: usize,
    /// Guest shared library made available before first use
    pub guest_library: Option<PathBuf>,
    /// Object runtime code run once after the guest starts
    pub guest_startup: Option<String>,
    /// `debug`, `info`, `warn` or `error`
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_name: "guest".to_string(),
            callback_module: "host".to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            guest_library: None,
            guest_startup: None,
            log_level: "warn".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from `explicit`, else the first config file found, else defaults.
    ///
    /// `TWINBRIDGE_LOG` overrides `log_level` in every case.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match find_config_file() {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        if let Ok(level) = std::env::var(LOG_ENV) {
            config.log_level = level;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&content).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|e| ConfigError::Parse {
            path: None,
            message: e.to_string(),
        })
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Parsed `log_level`
    pub fn level(&self) -> Result<LogLevel, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level \"{}\"", self.log_level)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.command_name.trim().is_empty() {
            return Err(ConfigError::Invalid("command_name must not be empty".into()));
        }
        if self.callback_module.is_empty() || self.callback_module.contains('.') {
            return Err(ConfigError::Invalid(format!(
                "callback_module \"{}\" must be a plain module name",
                self.callback_module
            )));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".into()));
        }
        self.level().map(|_| ())
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("twinbridge"));
    }

    // Fallback to ~/.config/twinbridge
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("twinbridge"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("twinbridge"));
    }

    None
}

/// Get the user config file path (~/.config/twinbridge/config.ron)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.ron"))
}

/// First existing config file: project-level, then user-level
pub fn find_config_file() -> Option<PathBuf> {
    let project = PathBuf::from(PROJECT_CONFIG_FILE);
    if project.is_file() {
        return Some(project);
    }
    get_config_path().filter(|p| p.is_file())
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error{}: {message}", parse_location(.path))]
    Parse {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("Config serialize error: {0}")]
    Serialize(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn parse_location(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.command_name, "guest");
        assert_eq!(config.callback_module, "host");
        assert_eq!(config.max_depth, 256);
        assert_eq!(config.level().unwrap(), LogLevel::Warn);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = BridgeConfig::from_ron("(command_name: \"py\", max_depth: 8)").unwrap();
        assert_eq!(config.command_name, "py");
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.callback_module, "host");
    }

    #[test]
    fn test_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.ron");
        let config = BridgeConfig {
            guest_startup: Some("ready = True".into()),
            ..BridgeConfig::default()
        };
        fs::write(&path, config.to_ron().unwrap()).unwrap();
        let loaded = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.guest_startup.as_deref(), Some("ready = True"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        fs::write(&path, "(command_name: ").unwrap();
        let err = BridgeConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.ron"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = BridgeConfig::load(Some(Path::new("/nonexistent/twinbridge.ron"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_validation() {
        let bad = BridgeConfig {
            callback_module: "a.b".into(),
            ..BridgeConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = BridgeConfig {
            log_level: "loud".into(),
            ..BridgeConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
