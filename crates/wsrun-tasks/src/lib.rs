//! wsrun Tasks - Script scheduling and execution engine
//!
//! This crate runs batches of inter-dependent shell scripts with bounded
//! concurrency, streams their output, and summarizes their exit records.

pub mod chunk;
pub mod dag;
pub mod multi_output;
pub mod output;
pub mod parallel;
pub mod reporter;
pub mod runner;
pub mod scheduler;
pub mod summary;
pub mod task;

pub use chunk::{strip_ansi, DecodeOptions, OutputChunk, OutputStreamName};
pub use dag::{DagError, TaskDag};
pub use multi_output::{MultiProcessOutput, OutputItem, OutputLane, ScriptOutputMetadata};
pub use output::{ByteStream, OutputError, ProcessOutput, TextStream};
pub use parallel::{ParallelError, ParallelMax, ParallelSpec, PARALLEL_DEFAULT_ENV, PARALLEL_MAX_ENV};
pub use reporter::{CollectingReporter, NoopReporter, TaskEvent, TaskReporter, TracingReporter};
pub use runner::{run_script, KillSignal, ScriptExit, ScriptKiller, ScriptRun, TaskError};
pub use scheduler::{PendingSummary, ScheduledRun, SchedulerOptions, ScriptScheduler};
pub use summary::{ExitRecord, RunSummary};
pub use task::{ScriptShell, ScriptTask};
