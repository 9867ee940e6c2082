//! Exit records and batch summaries

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Exit code reserved for tasks skipped because a dependency failed
pub const SKIPPED_EXIT_CODE: i32 = -1;

/// Exit code recorded when the process could not be spawned at all
pub const SPAWN_FAILED_EXIT_CODE: i32 = 127;

/// Terminal state of one script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitRecord<M> {
    /// Process exit code, `128 + n` for signal `n`, or -1 when skipped
    pub exit_code: i32,
    /// Name of the terminating signal, e.g. `SIGTERM`
    pub signal: Option<String>,
    pub success: bool,
    /// Never ran because a dependency failed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub metadata: M,
}

impl<M> ExitRecord<M> {
    /// Record for a process that ran and exited
    pub fn finished(
        metadata: M,
        exit_code: i32,
        signal: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            success: exit_code == 0 && signal.is_none(),
            exit_code,
            signal,
            skipped: false,
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds(),
            metadata,
        }
    }

    /// Record for a task skipped at `at` because a dependency failed
    pub fn skipped(metadata: M, at: DateTime<Utc>) -> Self {
        Self {
            exit_code: SKIPPED_EXIT_CODE,
            signal: None,
            success: false,
            skipped: true,
            start_time: at,
            end_time: at,
            duration_ms: 0,
            metadata,
        }
    }

    /// Record for a task whose process could not be started or observed
    pub fn spawn_failed(metadata: M, at: DateTime<Utc>) -> Self {
        Self::finished(metadata, SPAWN_FAILED_EXIT_CODE, None, at, at)
    }
}

/// Aggregate over every exit record of one scheduling call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary<M> {
    pub total_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub all_success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    /// Exit records in input order
    pub script_results: Vec<ExitRecord<M>>,
}

impl<M> RunSummary<M> {
    /// Summarize `records`, which must already be in input order.
    ///
    /// The batch window spans the earliest start to the latest end. With no
    /// records it falls back to `batch_start`/`batch_end`.
    pub fn from_records(
        records: Vec<ExitRecord<M>>,
        batch_start: DateTime<Utc>,
        batch_end: DateTime<Utc>,
    ) -> Self {
        let success_count = records.iter().filter(|r| r.success).count();
        let failure_count = records.len() - success_count;

        let start_time = records
            .iter()
            .map(|r| r.start_time)
            .min()
            .unwrap_or(batch_start);
        let end_time = records
            .iter()
            .map(|r| r.end_time)
            .max()
            .unwrap_or(batch_end)
            .max(start_time);

        Self {
            total_count: records.len(),
            success_count,
            failure_count,
            all_success: failure_count == 0,
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds(),
            script_results: records,
        }
    }

    /// Records of tasks that failed, skipped ones included
    pub fn failures(&self) -> impl Iterator<Item = &ExitRecord<M>> {
        self.script_results.iter().filter(|r| !r.success)
    }

    pub fn skipped_count(&self) -> usize {
        self.script_results.iter().filter(|r| r.skipped).count()
    }
}
