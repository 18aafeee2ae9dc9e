//! Structured lifecycle events for review runs and code changes.
//!
//! All events carry an `event` field so they can be filtered by name in log
//! pipelines, e.g. `event="run.finished"`.

use tracing::{info, warn};

/// Enters a span tagged with `run_id` for as long as it is alive.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a `vaahai.run` span tagged with `run_id`.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("vaahai.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a run was dispatched with `step_count` selected steps.
///
/// ```
/// vaahai_core::obs::emit_run_started("run-7", 3);
/// // logs: event=run.started run_id=run-7 step_count=3
/// ```
pub fn emit_run_started(run_id: &str, step_count: usize) {
    info!(event = "run.started", run_id = %run_id, step_count = step_count);
}

/// Emit event: a step returned its issues within the time limit.
pub fn emit_step_finished(run_id: &str, step_id: &str, issues: usize, duration_ms: u64) {
    info!(
        event = "step.finished",
        run_id = %run_id,
        step_id = %step_id,
        issues = issues,
        duration_ms = duration_ms,
    );
}

/// Emit event: a step errored, panicked or timed out (warning level).
pub fn emit_step_failed(run_id: &str, step_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "step.failed", run_id = %run_id, step_id = %step_id, error = %error);
}

/// Emit event: run finished with duration, issue total and failed step count.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    issues: usize,
    failed: usize,
    cancelled: bool,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        issues = issues,
        failed_steps = failed,
        cancelled = cancelled,
    );
}

/// Emit event: a change was written and its backup recorded.
pub fn emit_change_applied(file_path: &str, line: usize, backup_path: &str) {
    info!(
        event = "change.applied",
        file_path = %file_path,
        line = line,
        backup_path = %backup_path,
    );
}

/// Emit event: a change attempt was refused or rolled back (warning level).
pub fn emit_change_failed(file_path: &str, line: usize, error: &dyn std::fmt::Display) {
    warn!(event = "change.failed", file_path = %file_path, line = line, error = %error);
}

/// Emit event: a file was restored from the backup of its last change.
pub fn emit_change_undone(file_path: &str, backup_path: &str) {
    info!(event = "change.undone", file_path = %file_path, backup_path = %backup_path);
}

/// Emit event: retention deleted an old backup.
pub fn emit_backup_evicted(backup_path: &str) {
    info!(event = "backup.evicted", backup_path = %backup_path);
}
