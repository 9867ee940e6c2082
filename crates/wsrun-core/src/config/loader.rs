//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// A configuration together with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
}

impl LoadedConfig {
    /// Directory that workspace paths are relative to
    pub fn root_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Absolute directory of a workspace
    pub fn workspace_dir(&self, workspace_path: &Path) -> PathBuf {
        self.root_dir().join(workspace_path)
    }
}

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(
        path = %path.display(),
        workspaces = config.workspaces.len(),
        "config loaded and validated"
    );
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// The first name from [`config_file_names`] that exists wins. Parents are
/// walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.is_file() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<LoadedConfig> {
    let path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;
    let config = load_config(&path)?;
    Ok(LoadedConfig { config, path })
}

/// Load an explicit config file, or search upwards from `dir`
pub fn resolve_config(explicit: Option<&Path>, dir: &Path) -> Result<LoadedConfig> {
    match explicit {
        Some(path) => {
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                dir.join(path)
            };
            if !path.is_file() {
                return Err(ConfigError::NotFound(path).into());
            }
            let config = load_config(&path)?;
            Ok(LoadedConfig { config, path })
        }
        None => load_config_from_dir(dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WsrunError;
    use tempfile::TempDir;

    const MINIMAL_TOML: &str = "[[workspaces]]\nname = \"core\"\n";

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("wsrun.toml");
        std::fs::write(&config_path, MINIMAL_TOML).unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_toml_over_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("wsrun.toml");
        let yaml_path = temp.path().join("wsrun.yaml");
        std::fs::write(&toml_path, MINIMAL_TOML).unwrap();
        std::fs::write(&yaml_path, "workspaces:\n  - name: core\n").unwrap();

        let found = find_config(temp.path()).unwrap();
        assert_eq!(found, toml_path);
    }

    #[test]
    fn test_find_hidden_config() {
        let temp = TempDir::new().unwrap();
        let hidden = temp.path().join(".wsrun.yaml");
        std::fs::write(&hidden, "workspaces: []\n").unwrap();

        assert_eq!(find_config(temp.path()), Some(hidden));
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("wsrun.toml");
        std::fs::write(&config_path, MINIMAL_TOML).unwrap();
        let nested = temp.path().join("packages").join("core");
        std::fs::create_dir_all(&nested).unwrap();

        let loaded = load_config_from_dir(&nested).unwrap();
        assert_eq!(loaded.path, config_path);
        assert_eq!(loaded.root_dir(), temp.path());
        assert_eq!(
            loaded.workspace_dir(Path::new("packages/core")),
            temp.path().join("packages/core")
        );
    }

    #[test]
    fn test_load_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("wsrun.yaml");
        std::fs::write(
            &config_path,
            "run:\n  parallel: auto\nworkspaces:\n  - name: core\n    scripts:\n      build: make\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.workspaces[0].scripts["build"], "make");
    }

    #[test]
    fn test_load_invalid_config_fails_validation() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("wsrun.toml");
        std::fs::write(
            &config_path,
            "[[workspaces]]\nname = \"a\"\n\n[[workspaces]]\nname = \"a\"\n",
        )
        .unwrap();

        let err = load_config(&config_path).unwrap_err();
        assert!(matches!(
            err,
            WsrunError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_resolve_explicit_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("custom.toml"), MINIMAL_TOML).unwrap();

        let loaded = resolve_config(Some(Path::new("custom.toml")), temp.path()).unwrap();
        assert_eq!(loaded.config.workspace_names(), vec!["core"]);

        let missing = resolve_config(Some(Path::new("nope.toml")), temp.path());
        assert!(matches!(
            missing,
            Err(WsrunError::Config(ConfigError::NotFound(_)))
        ));
    }
}
