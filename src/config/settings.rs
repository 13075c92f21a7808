//! Application settings

use super::ConfigError;
use crate::core::bridge::BridgeConfig;
use crate::core::gateway::GatewayConfig;
use crate::core::transport::{RtuConfig, SerialConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
///
/// Every field has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial line framing
    pub serial: SerialConfig,
    /// RTU master settings
    pub rtu: RtuConfig,
    /// Gateway timing
    pub gateway: GatewayConfig,
    /// Bridge service
    pub bridge: BridgeConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        super::config_dir()
            .map(|dir| dir.join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(io_err)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
    /// Also write a daily-rolling log file
    pub file: bool,
    /// Directory for the log file; the platform data directory when unset
    pub directory: Option<PathBuf>,
    /// Echo the bridge log ring to stdout
    pub follow_ring: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: false,
            directory: None,
            follow_ring: true,
        }
    }
}

impl LoggingConfig {
    /// Where the rolling log file goes, if one is wanted
    pub fn file_dir(&self) -> Option<PathBuf> {
        if !self.file {
            return None;
        }
        self.directory.clone().or_else(super::log_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::SerialParity;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.parity, SerialParity::Even);
        assert_eq!(config.rtu.slave_id, 1);
        assert_eq!(config.rtu.timeout_ms, 1200);
        assert_eq!(config.gateway.cache_write_s, 35);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyAMA0"
            parity = "none"

            [gateway]
            throttle_ms = 50

            [rtu]
            tx_enable = "rts"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.serial.parity, SerialParity::None);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.gateway.throttle_ms, 50);
        assert_eq!(config.gateway.poll_interval_s, 10);
        assert_eq!(config.rtu.tx_enable, Some(crate::core::transport::DirectionLine::Rts));
        assert_eq!(config.rtu.rx_enable, None);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.serial.port = "COM7".to_string();
        config.bridge.status_interval_s = 30;
        config.logging.json = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(AppConfig::load_from(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[serial]\nbaud_rate = \"fast\"\n").unwrap();
        assert!(matches!(AppConfig::load_from(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_log_file_directory() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.file_dir(), None);

        logging.file = true;
        assert_eq!(logging.file_dir(), crate::config::log_dir());

        logging.directory = Some(PathBuf::from("/var/log/d3net"));
        assert_eq!(logging.file_dir(), Some(PathBuf::from("/var/log/d3net")));
    }
}
