//! Transactional code change manager.
//!
//! Every mutating operation on a path runs under that path's lock. The
//! shared state (history, undo stack, pending batch, backups) sits behind a
//! second mutex that is always taken after the path lock and never held
//! while waiting on another path.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use vaahai_core::files::{FileAccess, OsFileAccess};
use vaahai_core::metrics::METRICS;
use vaahai_core::obs::{self, RunSpan};

use crate::backup::{digest_of, BackupEntry, BackupStore};
use crate::config::ChangeConfig;
use crate::edit;
use crate::error::{ChangeError, ChangeResult};
use crate::record::{
    BatchFailure, BatchReport, ChangeOutcome, ChangeRecord, ChangeRequest, ChangeStatus,
    ChangeSummary,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One mutex per file path, created on first use.
#[derive(Debug, Default)]
struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    fn get(&self, path: &Path) -> Arc<Mutex<()>> {
        lock(&self.locks)
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }
}

/// Puts the original contents back unless disarmed.
///
/// Covers the window between the write and the history update, including
/// a panic inside the write.
struct RestoreGuard<'a> {
    files: &'a dyn FileAccess,
    path: &'a Path,
    original: &'a str,
    armed: bool,
}

impl<'a> RestoreGuard<'a> {
    fn new(files: &'a dyn FileAccess, path: &'a Path, original: &'a str) -> Self {
        Self {
            files,
            path,
            original,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// Restore now; returns whether the restore succeeded.
    fn restore(mut self) -> bool {
        self.armed = false;
        match self.files.write(self.path, self.original) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(file = %self.path.display(), error = %e, "rollback failed");
                false
            }
        }
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.files.write(self.path, self.original) {
                tracing::error!(file = %self.path.display(), error = %e, "rollback failed");
            }
        }
    }
}

#[derive(Debug)]
struct ChangeState {
    history: Vec<ChangeRecord>,
    /// Indices into `history` of applied changes, newest last.
    undo_stack: Vec<usize>,
    pending: Vec<ChangeRequest>,
    backups: BackupStore,
}

impl ChangeState {
    /// Backups of the latest applied, not undone change of each file.
    fn protected_backups(&self) -> HashSet<PathBuf> {
        let mut latest: HashMap<&Path, &Path> = HashMap::new();
        for record in &self.history {
            if record.status != ChangeStatus::Applied {
                continue;
            }
            if let Some(backup) = &record.backup_path {
                latest.insert(&record.file_path, backup);
            }
        }
        latest.into_values().map(Path::to_path_buf).collect()
    }
}

pub struct CodeChangeManager {
    config: ChangeConfig,
    files: Arc<dyn FileAccess>,
    path_locks: PathLocks,
    state: Mutex<ChangeState>,
}

impl fmt::Debug for CodeChangeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeChangeManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CodeChangeManager {
    pub fn new(config: ChangeConfig) -> Self {
        Self::with_file_access(config, Arc::new(OsFileAccess))
    }

    pub fn with_file_access(config: ChangeConfig, files: Arc<dyn FileAccess>) -> Self {
        let backups = BackupStore::new(config.backup_dir.clone(), config.max_backups);
        Self {
            config,
            files,
            path_locks: PathLocks::default(),
            state: Mutex::new(ChangeState {
                history: Vec::new(),
                undo_stack: Vec::new(),
                pending: Vec::new(),
                backups,
            }),
        }
    }

    pub fn config(&self) -> &ChangeConfig {
        &self.config
    }

    /// Apply one change: verify the original block, back the file up, write.
    ///
    /// A mismatch is a `Conflict` and leaves the file untouched with no
    /// backup taken. A failed write restores the original contents and
    /// reports `ApplyFailed`; the backup stays on disk. In dry-run mode the
    /// new contents are returned instead of written.
    pub fn apply_change(&self, request: &ChangeRequest) -> ChangeResult<ChangeOutcome> {
        request.validate()?;
        let path_lock = self.path_locks.get(&request.file_path);
        let _guard = lock(&path_lock);
        self.apply_locked(request)
    }

    fn apply_locked(&self, request: &ChangeRequest) -> ChangeResult<ChangeOutcome> {
        let path = request.file_path.as_path();

        let current = match self.files.read(path) {
            Ok(contents) => contents,
            Err(e) => {
                let err = ChangeError::file_access(path, e);
                return Err(self.record_failure(request, err, None));
            }
        };

        let updated = match edit::replace_block(
            &current,
            request.line_number,
            &request.original_code,
            &request.suggested_code,
        ) {
            Ok(updated) => updated,
            Err(e) => {
                let err = ChangeError::Conflict {
                    file_path: path.to_path_buf(),
                    line_number: request.line_number,
                    reason: e.to_string(),
                };
                return Err(self.record_failure(request, err, None));
            }
        };

        if self.config.dry_run {
            tracing::debug!(file = %path.display(), line = request.line_number, "change previewed");
            return Ok(ChangeOutcome::Previewed {
                file_path: path.to_path_buf(),
                new_content: updated,
            });
        }

        let backup = match self.write_backup(path, &current) {
            Ok(backup) => backup,
            Err(err) => return Err(self.record_failure(request, err, None)),
        };

        let guard = RestoreGuard::new(self.files.as_ref(), path, &current);
        if let Err(source) = self.files.write(path, &updated) {
            let rolled_back = guard.restore();
            let err = ChangeError::ApplyFailed {
                file_path: path.to_path_buf(),
                backup_path: backup.backup_path.clone(),
                rolled_back,
                source,
            };
            return Err(self.record_failure(request, err, Some(backup)));
        }

        let mut record = ChangeRecord::from_request(request, ChangeStatus::Applied);
        record.backup_path = Some(backup.backup_path.clone());
        record.backup_digest = Some(backup.digest.clone());

        let evicted = {
            let mut state = lock(&self.state);
            state.backups.record(backup.clone());
            state.history.push(record.clone());
            let index = state.history.len() - 1;
            state.undo_stack.push(index);
            let protected = state.protected_backups();
            state.backups.enforce_retention(&protected)
        };
        guard.disarm();

        self.remove_evicted(&evicted);
        METRICS.inc_changes_applied();
        obs::emit_change_applied(
            &path.display().to_string(),
            request.line_number,
            &backup.backup_path.display().to_string(),
        );
        Ok(ChangeOutcome::Applied(record))
    }

    /// Write a backup of `contents` without holding the state lock. The
    /// caller records the returned entry together with its history entry so
    /// retention never sees a backup without its owning record.
    fn write_backup(&self, path: &Path, contents: &str) -> ChangeResult<BackupEntry> {
        let backup_path = loop {
            let candidate = lock(&self.state).backups.next_backup_path(path);
            if !self.files.exists(&candidate) {
                break candidate;
            }
        };
        BackupStore::write_backup(self.files.as_ref(), path, backup_path, contents)
    }

    /// Record a failed attempt (outside dry-run) and hand the error back.
    fn record_failure(
        &self,
        request: &ChangeRequest,
        err: ChangeError,
        backup: Option<BackupEntry>,
    ) -> ChangeError {
        METRICS.inc_changes_failed();
        obs::emit_change_failed(
            &request.file_path.display().to_string(),
            request.line_number,
            &err,
        );
        if self.config.dry_run {
            return err;
        }

        let mut record = ChangeRecord::from_request(request, ChangeStatus::Failed).with_error(&err);
        let mut state = lock(&self.state);
        if let Some(backup) = backup {
            record.backup_path = Some(backup.backup_path.clone());
            record.backup_digest = Some(backup.digest.clone());
            state.backups.record(backup);
        }
        state.history.push(record);
        err
    }

    fn remove_evicted(&self, evicted: &[PathBuf]) {
        BackupStore::remove_files(self.files.as_ref(), evicted);
        for path in evicted {
            METRICS.inc_backups_evicted();
            obs::emit_backup_evicted(&path.display().to_string());
        }
    }

    /// Queue a change for [`Self::apply_pending_changes`]. Returns the queue length.
    pub fn add_pending_change(&self, request: ChangeRequest) -> ChangeResult<usize> {
        request.validate()?;
        let mut state = lock(&self.state);
        state.pending.push(request);
        Ok(state.pending.len())
    }

    /// Apply and clear the pending batch.
    ///
    /// Changes are grouped by file and applied bottom-up (descending line
    /// number) so earlier edits never shift the anchors of later ones. Each
    /// file's group runs under its path lock. A failure is counted and the
    /// batch moves on.
    pub fn apply_pending_changes(&self) -> BatchReport {
        let pending = std::mem::take(&mut lock(&self.state).pending);
        let batch_id = uuid::Uuid::new_v4().to_string();
        let _span = RunSpan::enter(&batch_id);

        let mut by_file: BTreeMap<PathBuf, Vec<ChangeRequest>> = BTreeMap::new();
        for request in pending {
            by_file
                .entry(request.file_path.clone())
                .or_default()
                .push(request);
        }

        let mut report = BatchReport::default();
        for (path, mut changes) in by_file {
            changes.sort_by(|a, b| b.line_number.cmp(&a.line_number));
            let path_lock = self.path_locks.get(&path);
            let _guard = lock(&path_lock);

            for request in &changes {
                match self.apply_locked(request) {
                    Ok(ChangeOutcome::Applied(_)) => report.applied += 1,
                    Ok(ChangeOutcome::Previewed { .. }) => report.previewed += 1,
                    Err(err) => {
                        report.failed += 1;
                        report.errors.push(BatchFailure {
                            file_path: request.file_path.clone(),
                            line_number: request.line_number,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            event = "batch.finished",
            batch_id = %batch_id,
            applied = report.applied,
            previewed = report.previewed,
            failed = report.failed,
        );
        report
    }

    /// Record that a suggestion was declined. The file is not touched.
    pub fn reject_change(&self, request: &ChangeRequest) -> ChangeRecord {
        let record = ChangeRecord::from_request(request, ChangeStatus::Rejected);
        lock(&self.state).history.push(record.clone());
        tracing::debug!(
            file = %request.file_path.display(),
            line = request.line_number,
            "change rejected"
        );
        record
    }

    /// Revert the most recent applied change from its backup.
    ///
    /// The backup must still exist and match its recorded digest; otherwise
    /// nothing is written and the record stays applied.
    pub fn undo_last_change(&self) -> ChangeResult<ChangeRecord> {
        loop {
            let (index, file_path) = {
                let state = lock(&self.state);
                let Some(&index) = state.undo_stack.last() else {
                    return Err(ChangeError::NoChangeToUndo {
                        reason: "no applied changes".to_string(),
                    });
                };
                (index, state.history[index].file_path.clone())
            };

            let path_lock = self.path_locks.get(&file_path);
            let _guard = lock(&path_lock);
            let record = {
                let state = lock(&self.state);
                if state.undo_stack.last() != Some(&index) {
                    // Another change landed or was undone while we waited.
                    continue;
                }
                state.history[index].clone()
            };
            return self.undo_locked(index, record);
        }
    }

    /// Restore `record`'s file from its backup. Runs under the file's path
    /// lock; the state lock is only taken to mark the record undone.
    fn undo_locked(&self, index: usize, record: ChangeRecord) -> ChangeResult<ChangeRecord> {
        let Some(backup_path) = record.backup_path.clone() else {
            return Err(ChangeError::NoChangeToUndo {
                reason: format!("change {} has no backup", record.id),
            });
        };
        if !self.files.exists(&backup_path) {
            return Err(ChangeError::NoChangeToUndo {
                reason: format!("backup {} is missing", backup_path.display()),
            });
        }

        let contents = self
            .files
            .read(&backup_path)
            .map_err(|e| ChangeError::file_access(&backup_path, e))?;
        if let Some(expected) = &record.backup_digest {
            if digest_of(&contents) != *expected {
                return Err(ChangeError::NoChangeToUndo {
                    reason: format!(
                        "backup {} does not match its recorded digest",
                        backup_path.display()
                    ),
                });
            }
        }

        self.files
            .write(&record.file_path, &contents)
            .map_err(|e| ChangeError::file_access(&record.file_path, e))?;

        let undone = {
            let mut state = lock(&self.state);
            let pos = state.undo_stack.iter().rposition(|&i| i == index);
            if let Some(pos) = pos {
                state.undo_stack.remove(pos);
            }
            match state.history.get_mut(index).filter(|r| r.id == record.id) {
                Some(entry) => {
                    entry.status = ChangeStatus::Undone;
                    entry.clone()
                }
                // History was reset while the file was being restored.
                None => ChangeRecord {
                    status: ChangeStatus::Undone,
                    ..record
                },
            }
        };
        METRICS.inc_changes_undone();
        obs::emit_change_undone(
            &undone.file_path.display().to_string(),
            &backup_path.display().to_string(),
        );
        Ok(undone)
    }

    /// Take a standalone backup of `path`, subject to retention.
    pub fn backup_file(&self, path: &Path) -> ChangeResult<BackupEntry> {
        let path_lock = self.path_locks.get(path);
        let _guard = lock(&path_lock);

        let contents = self
            .files
            .read(path)
            .map_err(|e| ChangeError::file_access(path, e))?;
        let entry = self.write_backup(path, &contents)?;
        let evicted = {
            let mut state = lock(&self.state);
            state.backups.record(entry.clone());
            let mut protected = state.protected_backups();
            protected.insert(entry.backup_path.clone());
            state.backups.enforce_retention(&protected)
        };
        self.remove_evicted(&evicted);
        Ok(entry)
    }

    /// Overwrite `path` with its newest backup. History is not changed.
    pub fn restore_latest_backup(&self, path: &Path) -> ChangeResult<BackupEntry> {
        let path_lock = self.path_locks.get(path);
        let _guard = lock(&path_lock);

        let entry = lock(&self.state)
            .backups
            .latest_for(path)
            .cloned()
            .ok_or_else(|| ChangeError::NoBackupAvailable {
                file_path: path.to_path_buf(),
            })?;
        let contents = BackupStore::read_verified(
            self.files.as_ref(),
            &entry.backup_path,
            Some(&entry.digest),
        )?;
        self.files
            .write(path, &contents)
            .map_err(|e| ChangeError::file_access(path, e))?;
        tracing::info!(
            file = %path.display(),
            backup = %entry.backup_path.display(),
            "restored from backup"
        );
        Ok(entry)
    }

    pub fn get_summary(&self) -> ChangeSummary {
        let state = lock(&self.state);
        ChangeSummary::from_history(&state.history, state.pending.len())
    }

    pub fn history(&self) -> Vec<ChangeRecord> {
        lock(&self.state).history.clone()
    }

    pub fn pending_changes(&self) -> Vec<ChangeRequest> {
        lock(&self.state).pending.clone()
    }

    /// Drop the pending batch without applying it. Returns how many were dropped.
    pub fn clear_pending_changes(&self) -> usize {
        let mut state = lock(&self.state);
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }

    /// Backups this manager holds for `path`, oldest first.
    pub fn backups_for(&self, path: &Path) -> Vec<BackupEntry> {
        lock(&self.state).backups.for_file(path)
    }

    /// Forget history, pending changes and tracked backups. Backup files stay on disk.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.history.clear();
        state.undo_stack.clear();
        state.pending.clear();
        state.backups.clear();
    }
}
