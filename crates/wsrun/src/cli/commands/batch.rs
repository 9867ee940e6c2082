//! Turning configured workspaces into a batch of script tasks

use std::path::Path;

use clap::Args;
use serde::Serialize;
use tracing::{debug, info};

use wsrun_core::config::{resolve_config, LoadedConfig};
use wsrun_core::{select_workspaces, WorkspaceError, WorkspaceGraph};
use wsrun_tasks::{ScriptShell, ScriptTask};

use crate::cli::Cli;

/// Name used for ad-hoc `--inline` commands
pub const INLINE_SCRIPT: &str = "inline";

/// Which script to run, and where
#[derive(Debug, Clone, Args)]
pub struct ScriptSelection {
    /// Script name, as declared in each workspace's `scripts` table
    #[arg(required_unless_present = "inline")]
    pub script: Option<String>,

    /// Run this command instead of a named script
    #[arg(long, conflicts_with = "script")]
    pub inline: Option<String>,

    /// Only run in these workspaces (can be repeated)
    #[arg(short, long = "workspace")]
    pub workspaces: Vec<String>,

    /// Shell program used as `<shell> -c <command>`
    #[arg(long)]
    pub shell: Option<String>,

    /// Extra arguments appended to every command
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl ScriptSelection {
    /// Script name shown in output labels
    pub fn script_name(&self) -> &str {
        self.script.as_deref().unwrap_or(INLINE_SCRIPT)
    }
}

/// Metadata attached to every scheduled script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptLabel {
    pub workspace: String,
    pub script: String,
}

impl std::fmt::Display for ScriptLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.workspace, self.script)
    }
}

/// A ready-to-schedule batch
#[derive(Debug)]
pub struct Batch {
    pub loaded: LoadedConfig,
    pub graph: WorkspaceGraph,
    pub tasks: Vec<ScriptTask<ScriptLabel>>,
}

impl Batch {
    /// Load the config found from `cli` and build tasks for `selection`
    pub fn load(cli: &Cli, selection: &ScriptSelection) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let loaded = resolve_config(cli.config.as_deref(), &cwd)?;
        Self::from_config(loaded, selection)
    }

    /// Build tasks for `selection` from an already loaded config.
    ///
    /// Selected workspaces that do not define the script are left out. A
    /// task depends on the task of each (cycle-stripped) workspace
    /// dependency that is also part of the batch.
    pub fn from_config(loaded: LoadedConfig, selection: &ScriptSelection) -> anyhow::Result<Self> {
        let config = &loaded.config;
        let graph = WorkspaceGraph::build(&config.workspaces);
        let selected = select_workspaces(config, &selection.workspaces)?;
        let script = selection.script_name();

        let shell = selection
            .shell
            .as_deref()
            .or(config.run.shell.as_deref())
            .map(ScriptShell::parse)
            .unwrap_or_default();

        let mut members = Vec::new();
        for ws in selected {
            let command = match (&selection.inline, &selection.script) {
                (Some(inline), _) => inline.clone(),
                (None, Some(name)) => match ws.scripts.get(name) {
                    Some(command) => command.clone(),
                    None => {
                        debug!(workspace = %ws.name, script = %name, "workspace has no such script");
                        continue;
                    }
                },
                (None, None) => continue,
            };
            members.push((ws, append_args(&command, &selection.args)));
        }

        if members.is_empty() {
            return Err(WorkspaceError::NoMatchingScripts(script.to_string()).into());
        }

        let tasks = members
            .iter()
            .map(|(ws, command)| {
                let dependencies = graph
                    .dependencies(&ws.name)
                    .iter()
                    .filter_map(|dep| members.iter().position(|(m, _)| &m.name == dep))
                    .collect();
                ScriptTask::new(
                    command.clone(),
                    loaded.workspace_dir(&ws.path),
                    ScriptLabel {
                        workspace: ws.name.clone(),
                        script: script.to_string(),
                    },
                )
                .with_envs(config.run.env.clone())
                .with_envs(ws.env.clone())
                .with_shell(shell.clone())
                .with_dependencies(dependencies)
            })
            .collect::<Vec<_>>();

        info!(
            config = %loaded.path.display(),
            script,
            tasks = tasks.len(),
            "batch prepared"
        );

        Ok(Self {
            loaded,
            graph,
            tasks,
        })
    }

    /// Directory of the config file
    pub fn root_dir(&self) -> &Path {
        self.loaded.root_dir()
    }
}

/// Append extra arguments to a command, space separated
fn append_args(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}
