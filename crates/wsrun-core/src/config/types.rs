//! Configuration types

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use wsrun_tasks::ParallelSpec;

/// Main configuration for wsrun
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults applied to every run
    pub run: RunConfig,

    /// Workspaces and their scripts
    pub workspaces: Vec<WorkspaceConfig>,
}

impl Config {
    /// Look up a workspace by exact name
    pub fn workspace(&self, name: &str) -> Option<&WorkspaceConfig> {
        self.workspaces.iter().find(|w| w.name == name)
    }

    /// Names of all workspaces, in declaration order
    pub fn workspace_names(&self) -> Vec<&str> {
        self.workspaces.iter().map(|w| w.name.as_str()).collect()
    }
}

/// Run defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Concurrency bound; absent means sequential
    pub parallel: Option<ParallelSpec>,

    /// Run dependents even when a dependency failed
    pub ignore_dependency_failure: bool,

    /// Strip ANSI escape sequences from printed output
    pub strip_ansi: bool,

    /// Shell program used as `<shell> -c <command>`
    pub shell: Option<String>,

    /// Variables applied to every script
    pub env: BTreeMap<String, String>,
}

/// One workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Unique workspace name
    pub name: String,

    /// Directory relative to the config file; defaults to the config directory
    pub path: PathBuf,

    /// Script name to command
    pub scripts: BTreeMap<String, String>,

    /// Names of workspaces this one depends on
    pub dependencies: Vec<String>,

    /// Variables applied to this workspace's scripts
    pub env: BTreeMap<String, String>,
}

impl WorkspaceConfig {
    /// Create a workspace rooted at `path`
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add a script
    pub fn with_script(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), command.into());
        self
    }

    /// Add a dependency on another workspace
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }
}
