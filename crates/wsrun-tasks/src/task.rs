//! Script task types

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a script command is executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptShell {
    /// `sh -c` on Unix, `cmd /C` on Windows
    #[default]
    System,
    /// `<program> -c <command>`
    Program(String),
}

impl ScriptShell {
    /// Parse a shell selector; `"system"` or an empty string mean the platform shell
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "system" => Self::System,
            program => Self::Program(program.to_string()),
        }
    }

    /// Program and leading arguments used to run `command`
    pub fn invocation(&self, command: &str) -> (String, Vec<String>) {
        match self {
            Self::System if cfg!(windows) => {
                ("cmd".to_string(), vec!["/C".to_string(), command.to_string()])
            }
            Self::System => ("sh".to_string(), vec!["-c".to_string(), command.to_string()]),
            Self::Program(program) => (
                program.clone(),
                vec!["-c".to_string(), command.to_string()],
            ),
        }
    }
}

impl fmt::Display for ScriptShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Program(program) => f.write_str(program),
        }
    }
}

/// One schedulable script invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTask<M> {
    /// Command line handed to the shell
    pub command: String,

    /// Directory the process runs in
    pub working_directory: PathBuf,

    /// Variables layered over the ambient environment
    pub env: BTreeMap<String, String>,

    /// Shell used to run the command
    pub shell: ScriptShell,

    /// Caller data carried through to output and exit records
    pub metadata: M,

    /// Indices of tasks in the same batch that must finish first
    pub depends_on: Vec<usize>,
}

impl<M> ScriptTask<M> {
    /// Create a task running `command` in `working_directory`
    pub fn new(command: impl Into<String>, working_directory: impl Into<PathBuf>, metadata: M) -> Self {
        Self {
            command: command.into(),
            working_directory: working_directory.into(),
            env: BTreeMap::new(),
            shell: ScriptShell::System,
            metadata,
            depends_on: Vec::new(),
        }
    }

    /// Set one environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merge several environment variables, later entries win
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the shell
    pub fn with_shell(mut self, shell: ScriptShell) -> Self {
        self.shell = shell;
        self
    }

    /// Add a dependency on the task at `index`
    pub fn with_dependency(mut self, index: usize) -> Self {
        if !self.depends_on.contains(&index) {
            self.depends_on.push(index);
        }
        self
    }

    /// Replace the dependency list
    pub fn with_dependencies(mut self, indices: Vec<usize>) -> Self {
        self.depends_on = Vec::new();
        for index in indices {
            self = self.with_dependency(index);
        }
        self
    }
}
