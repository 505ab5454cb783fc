//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::MockConfig;
use crate::config::validation::{validate, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load config from {path:?}: failed to parse YAML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to load config from {path:?}: configuration validation failed: {source}")]
    Validation {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

/// Load and validate configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<MockConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: MockConfig =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    validate(&config).map_err(|source| ConfigError::Validation {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(config)
}
