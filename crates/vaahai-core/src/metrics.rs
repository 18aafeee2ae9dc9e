//! Process-wide counters for review runs and code changes.
//!
//! Increment at the call site; call [`Metrics::flush`] at a natural boundary
//! to log all values as one event.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    steps_executed: AtomicU64,
    steps_failed: AtomicU64,
    steps_skipped: AtomicU64,
    changes_applied: AtomicU64,
    changes_failed: AtomicU64,
    changes_undone: AtomicU64,
    backups_evicted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub steps_executed: u64,
    pub steps_failed: u64,
    pub steps_skipped: u64,
    pub changes_applied: u64,
    pub changes_failed: u64,
    pub changes_undone: u64,
    pub backups_evicted: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            steps_executed: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            steps_skipped: AtomicU64::new(0),
            changes_applied: AtomicU64::new(0),
            changes_failed: AtomicU64::new(0),
            changes_undone: AtomicU64::new(0),
            backups_evicted: AtomicU64::new(0),
        }
    }

    /// Increment the steps-executed counter (every dispatched step, failed or not).
    pub fn inc_steps_executed(&self) {
        self.steps_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the steps-failed counter by one.
    pub fn inc_steps_failed(&self) {
        self.steps_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the steps-skipped counter by one.
    pub fn inc_steps_skipped(&self) {
        self.steps_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the changes-applied counter by one.
    pub fn inc_changes_applied(&self) {
        self.changes_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the changes-failed counter by one.
    pub fn inc_changes_failed(&self) {
        self.changes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the changes-undone counter by one.
    pub fn inc_changes_undone(&self) {
        self.changes_undone.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the backups-evicted counter by one.
    pub fn inc_backups_evicted(&self) {
        self.backups_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            steps_executed: self.steps_executed.load(Ordering::Relaxed),
            steps_failed: self.steps_failed.load(Ordering::Relaxed),
            steps_skipped: self.steps_skipped.load(Ordering::Relaxed),
            changes_applied: self.changes_applied.load(Ordering::Relaxed),
            changes_failed: self.changes_failed.load(Ordering::Relaxed),
            changes_undone: self.changes_undone.load(Ordering::Relaxed),
            backups_evicted: self.backups_evicted.load(Ordering::Relaxed),
        }
    }

    /// Log every counter as a single `info!` event.
    ///
    /// Call at natural boundaries (end of a run or a batch), not per increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            steps_executed = s.steps_executed,
            steps_failed = s.steps_failed,
            steps_skipped = s.steps_skipped,
            changes_applied = s.changes_applied,
            changes_failed = s.changes_failed,
            changes_undone = s.changes_undone,
            backups_evicted = s.backups_evicted,
        );
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        self.steps_executed.store(0, Ordering::Relaxed);
        self.steps_failed.store(0, Ordering::Relaxed);
        self.steps_skipped.store(0, Ordering::Relaxed);
        self.changes_applied.store(0, Ordering::Relaxed);
        self.changes_failed.store(0, Ordering::Relaxed);
        self.changes_undone.store(0, Ordering::Relaxed);
        self.backups_evicted.store(0, Ordering::Relaxed);
    }
}
