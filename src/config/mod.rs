//! Configuration module
//!
//! Handles application settings stored as TOML in the platform config directory

mod settings;

pub use settings::{AppConfig, LoggingConfig};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Platform has no config directory
    #[error("could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("{path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid configuration
    #[error("{path}: {source}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Configuration could not be rendered
    #[error("serialize: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "d3net", "d3net-bridge")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the log directory
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}
