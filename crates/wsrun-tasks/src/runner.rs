//! Single script execution
//!
//! [`run_script`] spawns one shell process for a [`ScriptTask`], hands back
//! its stdout/stderr as a [`MultiProcessOutput`], and resolves a
//! [`ScriptExit`] to an [`ExitRecord`] once the process terminates.

use std::fmt;
use std::process::{ExitStatus, Stdio};

use chrono::Utc;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::chunk::OutputStreamName;
use crate::multi_output::{MultiProcessOutput, OutputLane, ScriptOutputMetadata};
use crate::output::ProcessOutput;
use crate::summary::ExitRecord;
use crate::task::ScriptTask;

/// Errors starting or observing a script process
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The OS refused to start the process
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process was lost before its exit status could be collected
    #[error("Exit status of the script was lost")]
    ExitLost,
}

/// Signals a running script can be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KillSignal {
    Term,
    Kill,
    Int,
    Hup,
    Abrt,
    Quit,
    Usr1,
    Usr2,
}

impl KillSignal {
    #[cfg(unix)]
    const ALL: [KillSignal; 8] = [
        Self::Term,
        Self::Kill,
        Self::Int,
        Self::Hup,
        Self::Abrt,
        Self::Quit,
        Self::Usr1,
        Self::Usr2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Term => "SIGTERM",
            Self::Kill => "SIGKILL",
            Self::Int => "SIGINT",
            Self::Hup => "SIGHUP",
            Self::Abrt => "SIGABRT",
            Self::Quit => "SIGQUIT",
            Self::Usr1 => "SIGUSR1",
            Self::Usr2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    pub fn as_raw(&self) -> libc::c_int {
        match self {
            Self::Term => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
            Self::Int => libc::SIGINT,
            Self::Hup => libc::SIGHUP,
            Self::Abrt => libc::SIGABRT,
            Self::Quit => libc::SIGQUIT,
            Self::Usr1 => libc::SIGUSR1,
            Self::Usr2 => libc::SIGUSR2,
        }
    }

    #[cfg(unix)]
    pub fn from_raw(raw: libc::c_int) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_raw() == raw)
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle for sending signals to one script's process
#[derive(Debug, Clone)]
pub struct ScriptKiller {
    tx: mpsc::UnboundedSender<KillSignal>,
}

impl ScriptKiller {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<KillSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request delivery of `signal`.
    ///
    /// Returns `false` once the process has been reaped or the task will
    /// never run.
    pub fn kill(&self, signal: KillSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Pending exit record of one script
#[derive(Debug)]
pub struct ScriptExit<M> {
    rx: oneshot::Receiver<ExitRecord<M>>,
}

impl<M> ScriptExit<M> {
    pub(crate) fn channel() -> (oneshot::Sender<ExitRecord<M>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Wait for the script to reach a terminal state
    pub async fn wait(self) -> Result<ExitRecord<M>, TaskError> {
        self.rx.await.map_err(|_| TaskError::ExitLost)
    }
}

/// A started script
pub struct ScriptRun<M> {
    /// stdout and stderr, in that order
    pub output: MultiProcessOutput<ScriptOutputMetadata<M>>,
    /// Drain handles of the two pipes, stdout then stderr.
    ///
    /// `done()` resolves once a pipe reached EOF, `cancel()` stops reading it
    /// and ends the matching lane of `output`.
    pub channels: Vec<ProcessOutput<OutputStreamName>>,
    pub exit: ScriptExit<M>,
    pub killer: ScriptKiller,
}

pub(crate) type SpawnedOutput<M> = (
    MultiProcessOutput<ScriptOutputMetadata<M>>,
    Vec<ProcessOutput<OutputStreamName>>,
);

/// Spawn `task` as a shell process.
///
/// Must be called from within a Tokio runtime.
pub fn run_script<M>(task: ScriptTask<M>) -> Result<ScriptRun<M>, TaskError>
where
    M: Clone + Send + 'static,
{
    let (killer, kill_rx) = ScriptKiller::channel();
    let (exit_tx, exit) = ScriptExit::channel();
    let (output, channels) = spawn_script(task, &[], kill_rx, exit_tx)?;
    Ok(ScriptRun {
        output,
        channels,
        exit,
        killer,
    })
}

/// Spawn `task`, layering `extra_env` over its own environment.
///
/// The exit record is delivered on `exit_tx`; kill requests are read from
/// `kill_rx` until the process is reaped. Alongside the output, returns the
/// drain handle of each pipe in lane order.
pub(crate) fn spawn_script<M>(
    task: ScriptTask<M>,
    extra_env: &[(String, String)],
    kill_rx: mpsc::UnboundedReceiver<KillSignal>,
    exit_tx: oneshot::Sender<ExitRecord<M>>,
) -> Result<SpawnedOutput<M>, TaskError>
where
    M: Clone + Send + 'static,
{
    let ScriptTask {
        command,
        working_directory,
        env,
        shell,
        metadata,
        ..
    } = task;

    let (program, args) = shell.invocation(&command);
    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .current_dir(&working_directory)
        .envs(&env)
        .envs(extra_env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start_time = Utc::now();
    let spawn_error = |source| TaskError::Spawn {
        command: command.clone(),
        source,
    };
    let mut child = cmd.spawn().map_err(spawn_error)?;
    debug!(
        pid = child.id(),
        command = %command,
        cwd = %working_directory.display(),
        "spawned script"
    );

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| spawn_error(std::io::Error::other("stdout was not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| spawn_error(std::io::Error::other("stderr was not captured")))?;

    let opened = [
        ProcessOutput::from_reader_opened(stdout, OutputStreamName::Stdout),
        ProcessOutput::from_reader_opened(stderr, OutputStreamName::Stderr),
    ];
    let mut channels = Vec::with_capacity(opened.len());
    let mut lanes = Vec::with_capacity(opened.len());
    for (channel, bytes) in opened {
        lanes.push(OutputLane {
            metadata: ScriptOutputMetadata {
                metadata: metadata.clone(),
                stream_name: *channel.metadata(),
            },
            bytes,
        });
        channels.push(channel);
    }

    tokio::spawn(async move {
        let record = match wait_with_kill(&mut child, kill_rx).await {
            Ok(status) => {
                let (exit_code, signal) = exit_details(status);
                debug!(exit_code, ?signal, command = %command, "script exited");
                ExitRecord::finished(metadata, exit_code, signal, start_time, Utc::now())
            }
            Err(e) => {
                warn!(command = %command, error = %e, "failed to wait for script");
                return;
            }
        };
        let _ = exit_tx.send(record);
    });

    Ok((MultiProcessOutput::from_lanes(lanes), channels))
}

async fn wait_with_kill(
    child: &mut Child,
    mut kill_rx: mpsc::UnboundedReceiver<KillSignal>,
) -> std::io::Result<ExitStatus> {
    loop {
        tokio::select! {
            status = child.wait() => return status,
            Some(signal) = kill_rx.recv() => {
                if !deliver(child, signal) {
                    debug!(%signal, "signal not delivered");
                }
            }
        }
    }
}

#[cfg(unix)]
fn deliver(child: &mut Child, signal: KillSignal) -> bool {
    // id() is None once the child has been reaped, so the pid cannot be reused here
    match child.id() {
        Some(pid) => unsafe { libc::kill(pid as libc::pid_t, signal.as_raw()) == 0 },
        None => false,
    }
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, _signal: KillSignal) -> bool {
    child.start_kill().is_ok()
}

/// Exit code and signal name for a finished process
#[cfg(unix)]
fn exit_details(status: ExitStatus) -> (i32, Option<String>) {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => (code, None),
        (None, Some(raw)) => {
            let name = KillSignal::from_raw(raw)
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| format!("SIG{}", raw));
            (128 + raw, Some(name))
        }
        (None, None) => (1, None),
    }
}

#[cfg(not(unix))]
fn exit_details(status: ExitStatus) -> (i32, Option<String>) {
    (status.code().unwrap_or(1), None)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn run_collect(task: ScriptTask<&'static str>) -> (String, String, ExitRecord<&'static str>) {
        let run = run_script(task).unwrap();
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut text = run.output.text();
        while let Some(item) = text.next().await {
            match item.metadata.stream_name {
                OutputStreamName::Stdout => stdout.push_str(&item.chunk),
                OutputStreamName::Stderr => stderr.push_str(&item.chunk),
            }
        }
        let record = run.exit.wait().await.unwrap();
        (stdout, stderr, record)
    }

    #[tokio::test]
    async fn test_successful_script() {
        let (stdout, stderr, record) =
            run_collect(ScriptTask::new("echo test-script 1", ".", "app")).await;
        assert_eq!(stdout, "test-script 1\n");
        assert_eq!(stderr, "");
        assert_eq!(record.exit_code, 0);
        assert!(record.success);
        assert_eq!(record.signal, None);
        assert_eq!(record.metadata, "app");
        assert!(record.end_time >= record.start_time);
    }

    #[tokio::test]
    async fn test_failing_script_with_stderr() {
        let (stdout, stderr, record) = run_collect(ScriptTask::new(
            "echo out; echo err >&2; exit 2",
            ".",
            "app",
        ))
        .await;
        assert_eq!(stdout, "out\n");
        assert_eq!(stderr, "err\n");
        assert_eq!(record.exit_code, 2);
        assert!(!record.success);
    }

    #[tokio::test]
    async fn test_env_and_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        let task = ScriptTask::new("echo \"$WSRUN_TEST_VAR\"; pwd -P", dir.path(), "app")
            .with_env("WSRUN_TEST_VAR", "from-task");

        let (stdout, _, record) = run_collect(task).await;
        assert!(record.success);
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines[0], "from-task");
        assert_eq!(lines[1], expected.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_kill_reports_signal() {
        let run = run_script(ScriptTask::new("exec sleep 5", ".", "app")).unwrap();
        assert!(run.killer.kill(KillSignal::Abrt));

        let record = run.exit.wait().await.unwrap();
        assert_eq!(record.exit_code, 134);
        assert_eq!(record.signal.as_deref(), Some("SIGABRT"));
        assert!(!record.success);
        assert!(!run.killer.kill(KillSignal::Term));
    }

    #[tokio::test]
    async fn test_spawn_failure_in_missing_directory() {
        let result = run_script(ScriptTask::new("true", "/definitely/not/a/dir", ()));
        assert!(matches!(result, Err(TaskError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_unread_output_does_not_block_exit() {
        let run = run_script(ScriptTask::new(
            "i=0; while [ $i -lt 2000 ]; do echo 'a fairly long line of output to fill the pipe'; i=$((i+1)); done",
            ".",
            (),
        ))
        .unwrap();
        let record = run.exit.wait().await.unwrap();
        assert!(record.success);
    }

    #[tokio::test]
    async fn test_channels_finish_with_output() {
        let run = run_script(ScriptTask::new("echo out; echo err >&2", ".", ())).unwrap();
        let names: Vec<OutputStreamName> = run.channels.iter().map(|c| *c.metadata()).collect();
        assert_eq!(names, vec![OutputStreamName::Stdout, OutputStreamName::Stderr]);
        // the byte views already belong to `output`
        assert!(run.channels[0].bytes().is_err());

        let items: Vec<_> = run.output.text().collect().await;
        assert_eq!(items.len(), 2);
        for channel in &run.channels {
            channel.done().await.unwrap();
            assert!(channel.is_done());
            assert!(!channel.is_cancelled());
        }
        assert!(run.exit.wait().await.unwrap().success);
    }

    #[tokio::test]
    async fn test_cancelled_channel_ends_its_lane() {
        let mut run = run_script(ScriptTask::new("exec sleep 5", ".", ())).unwrap();
        let stdout = run.channels.remove(0);
        stdout.cancel();
        stdout.done().await.unwrap();
        assert!(stdout.is_cancelled());

        let mut lanes = run.output.into_lanes();
        let mut lane = lanes.remove(0);
        assert_eq!(lane.metadata.stream_name, OutputStreamName::Stdout);
        assert_eq!(lane.bytes.next_chunk().await, None);
        assert!(!run.channels[0].is_done());

        assert!(run.killer.kill(KillSignal::Term));
        let record = run.exit.wait().await.unwrap();
        assert_eq!(record.signal.as_deref(), Some("SIGTERM"));
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(KillSignal::from_raw(libc::SIGINT), Some(KillSignal::Int));
        assert_eq!(KillSignal::from_raw(libc::SIGKILL), Some(KillSignal::Kill));
        assert_eq!(KillSignal::from_raw(libc::SIGSEGV), None);
        assert_eq!(KillSignal::Usr2.to_string(), "SIGUSR2");
    }
}
