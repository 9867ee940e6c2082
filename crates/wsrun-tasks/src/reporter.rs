//! Script execution reporting

use std::sync::Mutex;
use std::time::Duration;

/// Events emitted by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A script is starting
    Started { index: usize, command: String },
    /// A script exited successfully
    Completed { index: usize, duration: Duration },
    /// A script failed, was killed, or could not be spawned
    Failed {
        index: usize,
        duration: Duration,
        exit_code: i32,
        signal: Option<String>,
    },
    /// A script was not run because a dependency failed
    Skipped { index: usize, failed_dependency: usize },
    /// Every script has a terminal state
    AllCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        duration: Duration,
    },
}

/// Trait for reporting script execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { index, command } => {
                tracing::info!("Starting script #{}: {}", index, command);
            }
            TaskEvent::Completed { index, duration } => {
                tracing::info!("Script #{} completed in {:.1}s", index, duration.as_secs_f64());
            }
            TaskEvent::Failed {
                index,
                duration,
                exit_code,
                signal,
            } => match signal {
                Some(signal) => tracing::error!(
                    "Script #{} terminated by {} after {:.1}s",
                    index,
                    signal,
                    duration.as_secs_f64()
                ),
                None => tracing::error!(
                    "Script #{} failed with exit code {} after {:.1}s",
                    index,
                    exit_code,
                    duration.as_secs_f64()
                ),
            },
            TaskEvent::Skipped {
                index,
                failed_dependency,
            } => {
                tracing::warn!(
                    "Script #{} skipped: dependency #{} did not succeed",
                    index,
                    failed_dependency
                );
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                skipped,
                duration,
            } => {
                tracing::info!(
                    "All scripts complete: {}/{} succeeded, {} failed, {} skipped ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    skipped,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Reporter that drops every event
#[derive(Debug, Default)]
pub struct NoopReporter;

impl TaskReporter for NoopReporter {
    fn report(&self, _event: &TaskEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();

        reporter.report(&TaskEvent::Started {
            index: 0,
            command: "cargo build".to_string(),
        });
        reporter.report(&TaskEvent::Completed {
            index: 0,
            duration: Duration::from_secs(5),
        });

        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], TaskEvent::Completed { index: 0, .. }));
    }

    #[test]
    fn test_tracing_reporter() {
        let reporter = TracingReporter;

        // Just verify it doesn't panic
        reporter.report(&TaskEvent::Failed {
            index: 1,
            duration: Duration::from_millis(20),
            exit_code: 143,
            signal: Some("SIGTERM".to_string()),
        });
        reporter.report(&TaskEvent::Skipped {
            index: 2,
            failed_dependency: 1,
        });
        reporter.report(&TaskEvent::AllCompleted {
            total: 3,
            succeeded: 1,
            failed: 2,
            skipped: 1,
            duration: Duration::from_secs(1),
        });
    }
}
