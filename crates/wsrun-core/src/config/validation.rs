//! Configuration validation

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_workspaces(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: String, message: impl Into<String>) -> crate::error::WsrunError {
    ConfigError::InvalidValue {
        field,
        message: message.into(),
    }
    .into()
}

fn validate_workspaces(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();

    for (i, workspace) in config.workspaces.iter().enumerate() {
        if workspace.name.trim().is_empty() {
            return Err(invalid(
                format!("workspaces[{}].name", i),
                "workspace name cannot be empty",
            ));
        }

        if !seen.insert(workspace.name.as_str()) {
            return Err(invalid(
                format!("workspaces[{}].name", i),
                format!("duplicate workspace name '{}'", workspace.name),
            ));
        }

        for (script, command) in &workspace.scripts {
            if command.trim().is_empty() {
                return Err(invalid(
                    format!("workspaces[{}].scripts.{}", i, script),
                    "script command cannot be empty",
                ));
            }
        }
    }

    Ok(())
}
