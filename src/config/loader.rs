//! Configuration and snapshot document loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ControlPlaneConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::resources::SnapshotDocument;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ControlPlaneConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ControlPlaneConfig =
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load a snapshot document. `.json` files are read as JSON, anything else as TOML.
pub fn load_snapshot_document(path: &Path) -> Result<SnapshotDocument, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_snapshot_document(&content, is_json(path))
}

pub fn parse_snapshot_document(content: &str, json: bool) -> Result<SnapshotDocument, ConfigError> {
    if json {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    } else {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}
