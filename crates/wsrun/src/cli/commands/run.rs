//! Run command - execute a script across the selected workspaces

use std::str::FromStr;
use std::sync::Arc;

use clap::Args;
use console::style;
use futures::StreamExt;
use tracing::info;

use wsrun_tasks::{
    OutputStreamName, ParallelMax, ParallelSpec, RunSummary, ScheduledRun, SchedulerOptions,
    ScriptScheduler, TaskEvent, TaskReporter, TracingReporter,
};

use crate::cli::output::{self, LinePrefixer};
use crate::cli::{Cli, OutputFormat};

use super::batch::{Batch, ScriptLabel, ScriptSelection};

/// Run a script in every selected workspace
#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    pub selection: ScriptSelection,

    /// Maximum concurrent scripts: a number, `n%` of CPUs, `auto`, `default`
    /// or `unbounded`. A bare `--parallel` means `default`
    #[arg(long, value_name = "MAX", num_args = 0..=1, default_missing_value = "default")]
    pub parallel: Option<String>,

    /// Run dependents even when a dependency failed
    #[arg(long)]
    pub ignore_dependency_failure: bool,

    /// Strip ANSI escape sequences from script output
    #[arg(long)]
    pub strip_ansi: bool,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    /// Resolve the concurrency bound: flag first, then config, else sequential
    fn parallel_max(&self, configured: Option<&ParallelSpec>) -> anyhow::Result<ParallelMax> {
        let spec = match &self.parallel {
            Some(raw) => Some(ParallelSpec::from_str(raw)?),
            None => configured.cloned(),
        };
        Ok(match spec {
            Some(spec) => spec.resolve()?,
            None => ParallelMax::SEQUENTIAL,
        })
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let batch = Batch::load(cli, &self.selection)?;
        let run_config = batch.loaded.config.run.clone();

        let options = SchedulerOptions {
            parallel: self.parallel_max(run_config.parallel.as_ref())?,
            ignore_dependency_failure: self.ignore_dependency_failure
                || run_config.ignore_dependency_failure,
        };
        let strip_ansi = self.strip_ansi || run_config.strip_ansi;
        let text_mode = cli.format == OutputFormat::Text && !cli.quiet;

        info!(
            script = self.selection.script_name(),
            tasks = batch.tasks.len(),
            parallel = %options.parallel,
            "executing run command"
        );

        if text_mode {
            for edge in batch.graph.cycles() {
                output::warning(&format!("Ignoring dependency cycle: {}", edge));
            }
            output::info(&format!(
                "Running {} in {} workspace{} (parallel: {})",
                style(self.selection.script_name()).bold(),
                batch.tasks.len(),
                if batch.tasks.len() == 1 { "" } else { "s" },
                options.parallel,
            ));
        }

        let labels: Vec<String> = batch.tasks.iter().map(|t| t.metadata.to_string()).collect();
        let reporter: Arc<dyn TaskReporter> = if text_mode {
            Arc::new(ConsoleReporter::new(labels, cli.verbose))
        } else {
            Arc::new(TracingReporter)
        };

        let scheduler = ScriptScheduler::new(options, reporter);
        let ScheduledRun {
            output: script_output,
            summary,
            ..
        } = scheduler.run(batch.tasks)?;

        // In JSON mode stdout carries only the summary document
        let stdout_to_stderr = cli.format == OutputFormat::Json;
        let mut prefixer = LinePrefixer::new(strip_ansi);
        let mut stream = script_output.bytes();
        while let Some(item) = stream.next().await {
            let (label, chunk) = item.into_chunk();
            for line in prefixer.push(&label.to_string(), &chunk) {
                print_line(chunk.stream_name, &line, stdout_to_stderr);
            }
        }
        for (stream_name, line) in prefixer.flush() {
            print_line(stream_name, &line, stdout_to_stderr);
        }

        let summary = summary.wait().await?;

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            OutputFormat::Text if !cli.quiet => print_failures(&summary),
            OutputFormat::Text => {}
        }

        if !summary.all_success {
            anyhow::bail!(
                "{} of {} script{} failed",
                summary.failure_count,
                summary.total_count,
                if summary.total_count == 1 { "" } else { "s" }
            );
        }

        Ok(())
    }
}

fn print_line(stream_name: OutputStreamName, line: &str, stdout_to_stderr: bool) {
    match stream_name {
        OutputStreamName::Stdout if !stdout_to_stderr => println!("{}", line),
        _ => eprintln!("{}", line),
    }
}

fn print_failures(summary: &RunSummary<ScriptLabel>) {
    if summary.all_success {
        return;
    }
    eprintln!();
    eprintln!(
        "  {} {}/{} scripts failed:",
        style("✗").red().bold(),
        summary.failure_count,
        summary.total_count
    );
    for record in summary.failures() {
        let reason = match (&record.signal, record.skipped) {
            (_, true) => "skipped".to_string(),
            (Some(signal), false) => format!("terminated by {}", signal),
            (None, false) => format!("exit code {}", record.exit_code),
        };
        eprintln!("    {} {}: {}", style("✗").red(), record.metadata, reason);
    }
}

/// Console reporter printing script lifecycle lines
struct ConsoleReporter {
    labels: Vec<String>,
    verbose: bool,
}

impl ConsoleReporter {
    fn new(labels: Vec<String>, verbose: bool) -> Self {
        Self { labels, verbose }
    }

    fn label(&self, index: usize) -> &str {
        self.labels.get(index).map(String::as_str).unwrap_or("?")
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { index, command } => {
                eprintln!(
                    "  {} {} {}",
                    style("▸").dim(),
                    style(self.label(*index)).bold(),
                    if self.verbose {
                        style(format!("({})", command)).dim().to_string()
                    } else {
                        String::new()
                    }
                );
            }
            TaskEvent::Completed { index, duration } => {
                eprintln!(
                    "  {} {} {}",
                    style("✓").green(),
                    style(self.label(*index)).green(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim()
                );
            }
            TaskEvent::Failed {
                index,
                duration,
                exit_code,
                signal,
            } => {
                let reason = match signal {
                    Some(signal) => signal.clone(),
                    None => format!("exit {}", exit_code),
                };
                eprintln!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(self.label(*index)).red(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(reason).red().dim()
                );
            }
            TaskEvent::Skipped {
                index,
                failed_dependency,
            } => {
                eprintln!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(self.label(*index)).yellow(),
                    style(format!("({} failed)", self.label(*failed_dependency))).dim()
                );
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                skipped,
                duration,
            } => {
                let line = format!(
                    "{}/{} succeeded, {} failed, {} skipped ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    skipped,
                    duration.as_secs_f64()
                );
                eprintln!();
                if *failed == 0 {
                    output::success(&line);
                } else {
                    output::error(&line);
                }
            }
        }
    }
}
