//! Dependency-aware script scheduler
//!
//! Each call to [`ScriptScheduler::run`] validates the batch, then spawns one
//! scheduling loop that owns all per-run state. The loop rescans the pending
//! tasks in index order whenever a running task finishes: tasks whose
//! dependencies all have an exit record are either skipped (a dependency
//! failed and the policy does not ignore that) or started while a
//! concurrency slot is free.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chunk::OutputStreamName;
use crate::dag::{DagError, TaskDag};
use crate::multi_output::{MultiProcessOutput, OutputLane, ScriptOutputMetadata};
use crate::output::{ByteStream, ProcessOutput};
use crate::parallel::{available_cpus, ParallelMax, PARALLEL_MAX_ENV};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::runner::{spawn_script, KillSignal, ScriptExit, ScriptKiller, TaskError};
use crate::summary::{ExitRecord, RunSummary};
use crate::task::ScriptTask;

/// Set to `true` to silence the oversubscription warning
pub const INTERNAL_TEST_ENV: &str = "WSRUN_INTERNAL_TEST";

/// Options for the script scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Maximum number of scripts running at once
    pub parallel: ParallelMax,
    /// Run dependents even when a dependency failed
    pub ignore_dependency_failure: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            parallel: ParallelMax::SEQUENTIAL,
            ignore_dependency_failure: false,
        }
    }
}

/// Pending batch summary
#[derive(Debug)]
pub struct PendingSummary<M> {
    rx: oneshot::Receiver<RunSummary<M>>,
}

impl<M> PendingSummary<M> {
    /// Wait until every script has a terminal state and all output is delivered
    pub async fn wait(self) -> Result<RunSummary<M>, TaskError> {
        self.rx.await.map_err(|_| TaskError::ExitLost)
    }
}

/// Handles to one scheduled batch
pub struct ScheduledRun<M> {
    /// Output of every script, two lanes per task (stdout, stderr) in input order
    pub output: MultiProcessOutput<ScriptOutputMetadata<M>>,
    /// Exit record of each task, in input order
    pub exits: Vec<ScriptExit<M>>,
    /// Kill handle of each task, in input order
    pub killers: Vec<ScriptKiller>,
    pub summary: PendingSummary<M>,
}

/// Runs batches of inter-dependent scripts with bounded concurrency
pub struct ScriptScheduler {
    options: SchedulerOptions,
    reporter: Arc<dyn TaskReporter>,
}

impl ScriptScheduler {
    /// Create a new scheduler
    pub fn new(options: SchedulerOptions, reporter: Arc<dyn TaskReporter>) -> Self {
        Self { options, reporter }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Validate `tasks` and start scheduling them.
    ///
    /// Fails before anything is spawned when a dependency index is out of
    /// range, self-referencing, or part of a cycle. Must be called from
    /// within a Tokio runtime.
    pub fn run<M>(&self, tasks: Vec<ScriptTask<M>>) -> Result<ScheduledRun<M>, DagError>
    where
        M: Clone + Send + 'static,
    {
        let dag = TaskDag::from_tasks(&tasks)?;
        let count = tasks.len();
        let parallel = self.options.parallel;

        info!(
            scripts = count,
            parallel = %parallel,
            ignore_dependency_failure = self.options.ignore_dependency_failure,
            "scheduling scripts"
        );
        warn_if_oversubscribed(parallel, count);

        let mut slots = Vec::with_capacity(count);
        let mut lanes = Vec::with_capacity(count * 2);
        let mut exits = Vec::with_capacity(count);
        let mut killers = Vec::with_capacity(count);

        for task in tasks {
            let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
            let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
            for (stream_name, rx) in [
                (OutputStreamName::Stdout, stdout_rx),
                (OutputStreamName::Stderr, stderr_rx),
            ] {
                lanes.push(OutputLane {
                    metadata: ScriptOutputMetadata {
                        metadata: task.metadata.clone(),
                        stream_name,
                    },
                    bytes: ByteStream::new(rx),
                });
            }

            let (exit_tx, exit) = ScriptExit::channel();
            let (killer, kill_rx) = ScriptKiller::channel();
            exits.push(exit);
            killers.push(killer);

            slots.push(Slot {
                metadata: task.metadata.clone(),
                task: Some(task),
                state: SlotState::Pending,
                kill_rx: Some(kill_rx),
                stdout_tx: Some(stdout_tx),
                stderr_tx: Some(stderr_tx),
                exit_tx: Some(exit_tx),
                record: None,
            });
        }

        let (summary_tx, summary_rx) = oneshot::channel();
        let run_loop = RunLoop {
            dag,
            slots,
            options: self.options,
            extra_env: vec![(PARALLEL_MAX_ENV.to_string(), parallel.to_string())],
            reporter: self.reporter.clone(),
        };
        tokio::spawn(async move {
            let summary = run_loop.run().await;
            let _ = summary_tx.send(summary);
        });

        Ok(ScheduledRun {
            output: MultiProcessOutput::from_lanes(lanes),
            exits,
            killers,
            summary: PendingSummary { rx: summary_rx },
        })
    }
}

fn warn_if_oversubscribed(parallel: ParallelMax, count: usize) {
    let batch = parallel.batch_size(count);
    let cpus = available_cpus();
    if batch <= cpus {
        return;
    }
    if std::env::var(INTERNAL_TEST_ENV).as_deref() == Ok("true") {
        return;
    }
    warn!(
        "Running {} scripts in parallel on {} available CPUs; this may degrade performance",
        batch, cpus
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Pending,
    Running,
    Done,
}

/// Per-task scheduling state, owned by the loop
struct Slot<M> {
    metadata: M,
    task: Option<ScriptTask<M>>,
    state: SlotState,
    kill_rx: Option<mpsc::UnboundedReceiver<KillSignal>>,
    stdout_tx: Option<mpsc::UnboundedSender<Bytes>>,
    stderr_tx: Option<mpsc::UnboundedSender<Bytes>>,
    exit_tx: Option<oneshot::Sender<ExitRecord<M>>>,
    record: Option<ExitRecord<M>>,
}

impl<M> Slot<M> {
    /// Store the terminal record and close this task's outward channels
    fn finish(&mut self, record: ExitRecord<M>)
    where
        M: Clone,
    {
        self.state = SlotState::Done;
        self.kill_rx = None;
        self.stdout_tx = None;
        self.stderr_tx = None;
        if let Some(tx) = self.exit_tx.take() {
            let _ = tx.send(record.clone());
        }
        self.record = Some(record);
    }
}

type Completion<M> = BoxFuture<'static, (usize, Result<ExitRecord<M>, TaskError>)>;

struct RunLoop<M> {
    dag: TaskDag,
    slots: Vec<Slot<M>>,
    options: SchedulerOptions,
    extra_env: Vec<(String, String)>,
    reporter: Arc<dyn TaskReporter>,
}

impl<M> RunLoop<M>
where
    M: Clone + Send + 'static,
{
    async fn run(mut self) -> RunSummary<M> {
        let batch_start = Utc::now();
        let mut running: FuturesUnordered<Completion<M>> = FuturesUnordered::new();
        let mut forwarders: Vec<JoinHandle<()>> = Vec::new();

        loop {
            self.schedule_ready(&mut running, &mut forwarders);

            let Some((index, result)) = running.next().await else {
                break;
            };
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    error!(index, error = %e, "lost exit status of script");
                    ExitRecord::spawn_failed(self.slots[index].metadata.clone(), Utc::now())
                }
            };
            self.report_exit(index, &record);
            self.slots[index].finish(record);
        }

        // a run ends only once every lane has been fully forwarded
        futures::future::join_all(forwarders).await;

        let count = self.slots.len();
        let records: Vec<ExitRecord<M>> = self
            .slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                if slot.record.is_none() {
                    error!(index, "script finished the run without an exit record");
                }
                slot.record
            })
            .collect();
        debug_assert_eq!(records.len(), count, "every script needs an exit record");
        let summary = RunSummary::from_records(records, batch_start, Utc::now());

        self.reporter.report(&TaskEvent::AllCompleted {
            total: summary.total_count,
            succeeded: summary.success_count,
            failed: summary.failure_count,
            skipped: summary.skipped_count(),
            duration: Duration::from_millis(summary.duration_ms.max(0) as u64),
        });
        summary
    }

    /// Skip or start every pending task whose dependencies have finished.
    ///
    /// Repeats while tasks reach a terminal state during the scan (skips and
    /// failed spawns), since that can make a lower index ready.
    fn schedule_ready(
        &mut self,
        running: &mut FuturesUnordered<Completion<M>>,
        forwarders: &mut Vec<JoinHandle<()>>,
    ) {
        loop {
            let mut changed = false;

            for index in 0..self.slots.len() {
                if self.slots[index].state != SlotState::Pending {
                    continue;
                }
                let deps = self.dag.dependencies(index);
                if !deps.iter().all(|&d| self.slots[d].state == SlotState::Done) {
                    continue;
                }

                if !self.options.ignore_dependency_failure {
                    let failed = deps.iter().copied().find(|&d| {
                        self.slots[d]
                            .record
                            .as_ref()
                            .is_some_and(|r| !r.success)
                    });
                    if let Some(failed_dependency) = failed {
                        self.skip(index, failed_dependency);
                        changed = true;
                        continue;
                    }
                }

                if self.options.parallel.has_capacity(running.len())
                    && self.start(index, running, forwarders)
                {
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }

    fn skip(&mut self, index: usize, failed_dependency: usize) {
        debug!(index, failed_dependency, "skipping script");
        self.reporter.report(&TaskEvent::Skipped {
            index,
            failed_dependency,
        });
        let slot = &mut self.slots[index];
        slot.task = None;
        let record = ExitRecord::skipped(slot.metadata.clone(), Utc::now());
        slot.finish(record);
    }

    /// Spawn the task at `index`. Returns `true` when it finished on the spot
    /// because the process could not be spawned.
    fn start(
        &mut self,
        index: usize,
        running: &mut FuturesUnordered<Completion<M>>,
        forwarders: &mut Vec<JoinHandle<()>>,
    ) -> bool {
        let slot = &mut self.slots[index];
        let Some(task) = slot.task.take() else {
            return false;
        };
        let Some(mut kill_rx) = slot.kill_rx.take() else {
            return false;
        };
        // kills requested before the start are dropped
        while kill_rx.try_recv().is_ok() {}

        self.reporter.report(&TaskEvent::Started {
            index,
            command: task.command.clone(),
        });

        let command = task.command.clone();
        let (exit_tx, exit) = ScriptExit::channel();

        match spawn_script(task, &self.extra_env, kill_rx, exit_tx) {
            Ok((output, channels)) => {
                slot.state = SlotState::Running;
                let senders = [slot.stdout_tx.take(), slot.stderr_tx.take()];
                let lanes = output.into_lanes().into_iter().zip(channels);
                for ((lane, channel), tx) in lanes.zip(senders) {
                    if let Some(tx) = tx {
                        forwarders.push(tokio::spawn(forward(index, lane.bytes, channel, tx)));
                    }
                }
                running.push(Box::pin(async move { (index, exit.wait().await) }));
                false
            }
            Err(e) => {
                error!(index, command = %command, error = %e, "failed to start script");
                if let Some(tx) = &slot.stderr_tx {
                    let _ = tx.send(Bytes::from(format!("{}\n", e)));
                }
                let record = ExitRecord::spawn_failed(slot.metadata.clone(), Utc::now());
                self.report_exit(index, &record);
                self.slots[index].finish(record);
                true
            }
        }
    }

    fn report_exit(&self, index: usize, record: &ExitRecord<M>) {
        let duration = Duration::from_millis(record.duration_ms.max(0) as u64);
        let event = if record.success {
            TaskEvent::Completed { index, duration }
        } else {
            TaskEvent::Failed {
                index,
                duration,
                exit_code: record.exit_code,
                signal: record.signal.clone(),
            }
        };
        self.reporter.report(&event);
    }
}

/// Copy one runner lane into the batch lane it belongs to
async fn forward(
    index: usize,
    mut bytes: ByteStream,
    channel: ProcessOutput<OutputStreamName>,
    tx: mpsc::UnboundedSender<Bytes>,
) {
    while let Some(chunk) = bytes.next_chunk().await {
        // nobody reading the batch output is fine, keep draining
        let _ = tx.send(chunk);
    }
    if let Err(e) = channel.done().await {
        warn!(
            index,
            stream = %channel.metadata(),
            error = %e,
            "script output ended with a read error"
        );
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use std::path::Path;
    use tempfile::TempDir;

    fn scheduler(parallel: ParallelMax, ignore_dependency_failure: bool) -> ScriptScheduler {
        ScriptScheduler::new(
            SchedulerOptions {
                parallel,
                ignore_dependency_failure,
            },
            Arc::new(CollectingReporter::default()),
        )
    }

    fn limited(n: usize) -> ParallelMax {
        ParallelMax::limited(n).unwrap()
    }

    /// A task that logs its start and end to `log` around a short sleep
    fn logged(dir: &Path, name: &'static str, body: &str) -> ScriptTask<&'static str> {
        let command = format!(
            "echo start-{name} >> log; {body}; status=$?; echo end-{name} >> log; exit $status"
        );
        ScriptTask::new(command, dir, name)
    }

    fn read_log(dir: &TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn position(log: &[String], line: &str) -> usize {
        log.iter()
            .position(|l| l == line)
            .unwrap_or_else(|| panic!("{} not in {:?}", line, log))
    }

    #[tokio::test]
    async fn test_sequential_runs_in_input_order() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            logged(dir.path(), "a", "sleep 0.2"),
            logged(dir.path(), "b", "true"),
        ];

        let run = scheduler(ParallelMax::SEQUENTIAL, false).run(tasks).unwrap();
        let summary = run.summary.wait().await.unwrap();

        assert!(summary.all_success);
        assert_eq!(read_log(&dir), vec!["start-a", "end-a", "start-b", "end-b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dependents_start_after_dependency() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            logged(dir.path(), "a", "sleep 0.2"),
            logged(dir.path(), "b", "sleep 0.2").with_dependency(0),
            logged(dir.path(), "c", "sleep 0.2").with_dependency(0),
        ];

        let run = scheduler(ParallelMax::Unbounded, false).run(tasks).unwrap();
        let summary = run.summary.wait().await.unwrap();
        assert!(summary.all_success);

        let log = read_log(&dir);
        let end_a = position(&log, "end-a");
        assert!(position(&log, "start-b") > end_a);
        assert!(position(&log, "start-c") > end_a);
        // b and c overlap
        assert!(position(&log, "start-c") < position(&log, "end-b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bound_is_respected() {
        let dir = TempDir::new().unwrap();
        let names = ["a", "b", "c", "d", "e"];
        let tasks = names
            .iter()
            .map(|&name| logged(dir.path(), name, "sleep 0.1"))
            .collect();

        let run = scheduler(limited(2), false).run(tasks).unwrap();
        run.summary.wait().await.unwrap();

        let mut active = 0i32;
        let mut peak = 0i32;
        for line in read_log(&dir) {
            if line.starts_with("start-") {
                active += 1;
            } else {
                active -= 1;
            }
            peak = peak.max(active);
        }
        assert_eq!(peak, 2);
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependents() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            logged(dir.path(), "a", "exit 1"),
            logged(dir.path(), "b", "true").with_dependency(0),
            logged(dir.path(), "c", "true").with_dependency(1),
        ];

        let run = scheduler(limited(2), false).run(tasks).unwrap();
        let summary = run.summary.wait().await.unwrap();

        assert_eq!(summary.failure_count, 3);
        assert_eq!(summary.success_count, 0);
        let a = &summary.script_results[0];
        assert_eq!(a.exit_code, 1);
        assert!(!a.skipped);
        for skipped in &summary.script_results[1..] {
            assert!(skipped.skipped);
            assert_eq!(skipped.exit_code, -1);
            assert_eq!(skipped.duration_ms, 0);
        }
        assert_eq!(read_log(&dir), vec!["start-a", "end-a"]);
    }

    #[tokio::test]
    async fn test_ignore_dependency_failure_runs_dependents() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            logged(dir.path(), "a", "exit 1"),
            logged(dir.path(), "b", "true").with_dependency(0),
        ];

        let run = scheduler(limited(2), true).run(tasks).unwrap();
        let summary = run.summary.wait().await.unwrap();

        let b = &summary.script_results[1];
        assert!(!b.skipped);
        assert!(b.success);
        assert!(b.start_time >= summary.script_results[0].end_time);
        assert_eq!(summary.failure_count, 1);
    }

    #[tokio::test]
    async fn test_summary_keeps_input_order() {
        let dir = TempDir::new().unwrap();
        // submitted as [c, a, b], executed as a, b, c
        let tasks = vec![
            logged(dir.path(), "c", "true").with_dependency(2),
            logged(dir.path(), "a", "true"),
            logged(dir.path(), "b", "true").with_dependency(1),
        ];

        let run = scheduler(ParallelMax::Unbounded, false).run(tasks).unwrap();
        let summary = run.summary.wait().await.unwrap();

        let order: Vec<_> = summary.script_results.iter().map(|r| r.metadata).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(
            read_log(&dir),
            vec!["start-a", "end-a", "start-b", "end-b", "start-c", "end-c"]
        );
        assert_eq!(summary.start_time, summary.script_results[1].start_time);
        assert_eq!(summary.end_time, summary.script_results[0].end_time);
    }

    #[tokio::test]
    async fn test_validation_errors_fail_fast() {
        let s = scheduler(ParallelMax::Unbounded, false);
        let task = |deps: Vec<usize>| ScriptTask::new("true", ".", ()).with_dependencies(deps);

        let err = s.run(vec![task(vec![0])]).err().unwrap();
        assert_eq!(err, DagError::SelfDependency { index: 0 });

        let err = s.run(vec![task(vec![3])]).err().unwrap();
        assert!(matches!(err, DagError::InvalidIndex { dependency: 3, .. }));

        let err = s.run(vec![task(vec![1]), task(vec![0])]).err().unwrap();
        assert_eq!(err.to_string(), "Dependency cycle detected: 0 -> 1 -> 0");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let run = scheduler(ParallelMax::Unbounded, false)
            .run(Vec::<ScriptTask<()>>::new())
            .unwrap();
        let items: Vec<_> = run.output.bytes().collect().await;
        assert!(items.is_empty());

        let summary = run.summary.wait().await.unwrap();
        assert_eq!(summary.total_count, 0);
        assert!(summary.all_success);
    }

    #[tokio::test]
    async fn test_output_is_tagged_and_parallel_max_injected() {
        let tasks = vec![
            ScriptTask::new("echo \"max=$WSRUN_PARALLEL_MAX\"", ".", "a"),
            ScriptTask::new("echo oops >&2", ".", "b").with_env("WSRUN_PARALLEL_MAX", "99"),
        ];

        let run = scheduler(limited(3), false).run(tasks).unwrap();
        let items: Vec<_> = run.output.text().collect().await;

        let find = |name: &str, stream: OutputStreamName| -> String {
            items
                .iter()
                .filter(|i| i.metadata.metadata == name && i.metadata.stream_name == stream)
                .map(|i| i.chunk.as_str())
                .collect()
        };
        assert_eq!(find("a", OutputStreamName::Stdout), "max=3\n");
        assert_eq!(find("b", OutputStreamName::Stderr), "oops\n");
        assert_eq!(find("b", OutputStreamName::Stdout), "");

        assert!(run.summary.wait().await.unwrap().all_success);
    }

    #[tokio::test]
    async fn test_per_task_exits_and_events() {
        let reporter = Arc::new(CollectingReporter::default());
        let s = ScriptScheduler::new(SchedulerOptions::default(), reporter.clone());
        let tasks = vec![
            ScriptTask::new("exit 3", ".", "a"),
            ScriptTask::new("true", ".", "b").with_dependency(0),
        ];

        let mut run = s.run(tasks).unwrap();
        let exits = std::mem::take(&mut run.exits);
        let mut records = Vec::new();
        for exit in exits {
            records.push(exit.wait().await.unwrap());
        }
        assert_eq!(records[0].exit_code, 3);
        assert!(records[1].skipped);

        let summary = run.summary.wait().await.unwrap();
        assert_eq!(summary.script_results, records);

        let events = reporter.events();
        assert!(matches!(events[0], TaskEvent::Started { index: 0, .. }));
        assert!(matches!(
            events[1],
            TaskEvent::Failed {
                index: 0,
                exit_code: 3,
                ..
            }
        ));
        assert_eq!(
            events[2],
            TaskEvent::Skipped {
                index: 1,
                failed_dependency: 0
            }
        );
        assert!(matches!(
            events.last(),
            Some(TaskEvent::AllCompleted {
                total: 2,
                failed: 2,
                skipped: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_kill_running_task() {
        let tasks = vec![
            ScriptTask::new("exec sleep 5", ".", "long"),
            ScriptTask::new("true", ".", "after").with_dependency(0),
        ];
        let run = scheduler(ParallelMax::Unbounded, false).run(tasks).unwrap();

        // give the loop a moment to spawn the process
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(run.killers[0].kill(KillSignal::Term));

        let summary = run.summary.wait().await.unwrap();
        let killed = &summary.script_results[0];
        assert_eq!(killed.exit_code, 143);
        assert_eq!(killed.signal.as_deref(), Some("SIGTERM"));
        assert!(summary.script_results[1].skipped);
        assert!(!run.killers[1].kill(KillSignal::Term));
    }

    #[tokio::test]
    async fn test_kill_before_start_is_ignored() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![
            logged(dir.path(), "a", "sleep 0.1"),
            logged(dir.path(), "b", "true"),
        ];
        let run = scheduler(ParallelMax::SEQUENTIAL, false).run(tasks).unwrap();
        run.killers[1].kill(KillSignal::Kill);

        let summary = run.summary.wait().await.unwrap();
        assert!(summary.all_success);
        assert_eq!(read_log(&dir).len(), 4);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_recorded() {
        let tasks = vec![
            ScriptTask::new("true", "/definitely/not/a/dir", "missing"),
            ScriptTask::new("true", ".", "next").with_dependency(0),
            ScriptTask::new("true", ".", "independent"),
        ];
        let run = scheduler(ParallelMax::Unbounded, false).run(tasks).unwrap();
        let lanes = run.output.into_lanes();

        let summary = run.summary.wait().await.unwrap();
        assert_eq!(summary.script_results[0].exit_code, 127);
        assert!(!summary.script_results[0].skipped);
        assert!(summary.script_results[1].skipped);
        assert!(summary.script_results[2].success);

        let mut stderr = lanes.into_iter().nth(1).unwrap().bytes.into_text();
        let message = stderr.next_text().await.unwrap();
        assert!(message.contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_spawn_failure_unblocks_lower_index_dependent() {
        let tasks = vec![
            ScriptTask::new("true", ".", "dependent").with_dependency(1),
            ScriptTask::new("true", "/definitely/not/a/dir", "missing"),
        ];
        let run = scheduler(ParallelMax::SEQUENTIAL, false).run(tasks).unwrap();
        let mut exits = run.exits.into_iter();
        let dependent_exit = exits.next().unwrap();

        let summary = run.summary.wait().await.unwrap();
        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.script_results.len(), 2);
        assert!(summary.script_results[0].skipped);
        assert_eq!(summary.script_results[0].exit_code, -1);
        assert_eq!(summary.script_results[1].exit_code, 127);

        let record = dependent_exit.wait().await.unwrap();
        assert!(record.skipped);
    }

    #[tokio::test]
    async fn test_spawn_failure_with_ignore_policy_still_runs_dependent() {
        let tasks = vec![
            ScriptTask::new("true", ".", "dependent").with_dependency(1),
            ScriptTask::new("true", "/definitely/not/a/dir", "missing"),
        ];
        let run = scheduler(ParallelMax::SEQUENTIAL, true).run(tasks).unwrap();

        let summary = run.summary.wait().await.unwrap();
        assert_eq!(summary.total_count, 2);
        assert!(summary.script_results[0].success);
        assert!(!summary.script_results[0].skipped);
        assert_eq!(summary.script_results[1].exit_code, 127);
    }
}
