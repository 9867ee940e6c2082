//! Plan command - show execution waves without running anything

use clap::Args;
use console::style;
use tracing::info;

use wsrun_tasks::TaskDag;

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

use super::batch::{Batch, ScriptSelection};

/// Show the execution waves for a script
#[derive(Debug, Args)]
pub struct PlanCommand {
    #[command(flatten)]
    pub selection: ScriptSelection,
}

impl PlanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(script = self.selection.script_name(), "executing plan command");
        let batch = Batch::load(cli, &self.selection)?;
        let dag = TaskDag::from_tasks(&batch.tasks)?;
        let label = |index: usize| batch.tasks[index].metadata.to_string();

        match cli.format {
            OutputFormat::Json => {
                let plan = serde_json::json!({
                    "config": batch.loaded.path,
                    "waves": dag
                        .waves()
                        .iter()
                        .map(|wave| wave.iter().map(|&i| label(i)).collect::<Vec<_>>())
                        .collect::<Vec<_>>(),
                    "scripts": batch.tasks.iter().enumerate().map(|(i, task)| {
                        serde_json::json!({
                            "workspace": task.metadata.workspace,
                            "script": task.metadata.script,
                            "command": task.command,
                            "directory": task.working_directory,
                            "wave": dag.wave(i),
                            "after": dag.dependencies(i).iter().map(|&d| label(d)).collect::<Vec<_>>(),
                        })
                    }).collect::<Vec<_>>(),
                    "ignored_cycles": batch.graph.cycles().iter().map(|edge| {
                        serde_json::json!({
                            "dependent": edge.dependent,
                            "dependency": edge.dependency,
                        })
                    }).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&plan)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!(
                        "{} {}",
                        output::header("Execution plan"),
                        style(format!("({})", batch.root_dir().display())).dim()
                    );
                    println!();
                }
                print!("{}", dag.execution_plan(label));

                if batch.graph.has_cycles() {
                    println!();
                    println!("{}", output::header("Ignored dependency cycles"));
                    for edge in batch.graph.cycles() {
                        println!("  {}", edge);
                    }
                }
            }
        }

        Ok(())
    }
}
