//! Error types for wsrun

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using WsrunError
pub type Result<T> = std::result::Result<T, WsrunError>;

/// Main error type for wsrun operations
#[derive(Debug, Error)]
pub enum WsrunError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Workspace selection errors
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors selecting workspaces and scripts
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// No configured workspace has this name
    #[error("Workspace not found: {0}")]
    NotFound(String),

    /// None of the selected workspaces defines the script
    #[error("No workspace defines script '{0}'")]
    NoMatchingScripts(String),
}

impl WsrunError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
