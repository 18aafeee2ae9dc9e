//! Change application against a real directory tree.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use vaahai_apply::{ChangeConfig, ChangeError, ChangeRequest, ChangeStatus, CodeChangeManager};
use vaahai_core::fakes::MemoryFileAccess;
use vaahai_core::files::{FileAccess, OsFileAccess};

fn setup(contents: &str) -> (TempDir, PathBuf, CodeChangeManager) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("app.py");
    std::fs::write(&file, contents).unwrap();
    let manager = CodeChangeManager::new(ChangeConfig::with_backup_dir(dir.path().join("backups")));
    (dir, file, manager)
}

fn ten_lines() -> String {
    (1..=10).map(|i| format!("line {i}\n")).collect()
}

#[test]
fn test_apply_and_undo_round_trip_on_disk() {
    let original = "def f():\r\n    return 1\r\n";
    let (_dir, file, manager) = setup(original);

    manager
        .apply_change(&ChangeRequest::new(&file, 2, "    return 1", "    return 2"))
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "def f():\r\n    return 2\r\n"
    );

    manager.undo_last_change().unwrap();
    assert_eq!(std::fs::read(&file).unwrap(), original.as_bytes());
}

#[test]
fn test_conflict_leaves_file_byte_identical() {
    let (dir, file, manager) = setup(&ten_lines());
    let before = std::fs::read(&file).unwrap();

    let err = manager
        .apply_change(&ChangeRequest::new(&file, 3, "line 4", "changed"))
        .unwrap_err();

    assert!(matches!(err, ChangeError::Conflict { .. }));
    assert_eq!(std::fs::read(&file).unwrap(), before);
    assert!(!dir.path().join("backups").exists());
}

#[test]
fn test_each_apply_takes_exactly_one_backup() {
    let (dir, file, manager) = setup(&ten_lines());
    manager
        .apply_change(&ChangeRequest::new(&file, 1, "line 1", "first"))
        .unwrap();
    manager
        .apply_change(&ChangeRequest::new(&file, 2, "line 2", "second"))
        .unwrap();

    let on_disk = std::fs::read_dir(dir.path().join("backups")).unwrap().count();
    assert_eq!(on_disk, 2);
    assert_eq!(manager.backups_for(&file).len(), 2);
}

#[test]
fn test_batch_with_ascending_submission_applies_both() {
    let (_dir, file, manager) = setup(&ten_lines());
    manager
        .add_pending_change(ChangeRequest::new(&file, 5, "line 5", "five a\nfive b"))
        .unwrap();
    manager
        .add_pending_change(ChangeRequest::new(&file, 10, "line 10", "ten"))
        .unwrap();

    let report = manager.apply_pending_changes();
    assert_eq!(report.applied, 2);
    assert_eq!(report.failed, 0);

    let text = std::fs::read_to_string(&file).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[4], "five a");
    assert_eq!(lines[5], "five b");
    assert_eq!(lines[10], "ten");
    assert!(manager.pending_changes().is_empty());
}

/// Fails the first write to `target`, then behaves normally.
struct FlakyWrites {
    target: PathBuf,
    failures_left: AtomicUsize,
}

impl FileAccess for FlakyWrites {
    fn read(&self, path: &Path) -> io::Result<String> {
        OsFileAccess.read(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if path == self.target
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        OsFileAccess.write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        OsFileAccess.exists(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        OsFileAccess.remove(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        OsFileAccess.create_dir_all(path)
    }
}

#[test]
fn test_injected_write_failure_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("app.py");
    std::fs::write(&file, "x = 1\n").unwrap();
    let files = Arc::new(FlakyWrites {
        target: file.clone(),
        failures_left: AtomicUsize::new(1),
    });
    let manager = CodeChangeManager::with_file_access(
        ChangeConfig::with_backup_dir(dir.path().join("backups")),
        files,
    );

    let err = manager
        .apply_change(&ChangeRequest::new(&file, 1, "x = 1", "x = 2"))
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert!(err.had_side_effects());
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "x = 1\n");

    let ChangeError::ApplyFailed { backup_path, .. } = err else {
        panic!("expected ApplyFailed");
    };
    assert_eq!(std::fs::read_to_string(backup_path).unwrap(), "x = 1\n");
    assert_eq!(manager.history()[0].status, ChangeStatus::Failed);

    // The next attempt goes through.
    manager
        .apply_change(&ChangeRequest::new(&file, 1, "x = 1", "x = 2"))
        .unwrap();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "x = 2\n");
}

#[test]
fn test_retention_never_drops_undo_backup() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.py");
    let b = dir.path().join("b.py");
    std::fs::write(&a, "a0\n").unwrap();
    std::fs::write(&b, "b0\n").unwrap();

    let mut config = ChangeConfig::with_backup_dir(dir.path().join("backups"));
    config.max_backups = 1;
    let manager = CodeChangeManager::new(config);

    manager
        .apply_change(&ChangeRequest::new(&a, 1, "a0", "a1"))
        .unwrap();
    manager
        .apply_change(&ChangeRequest::new(&b, 1, "b0", "b1"))
        .unwrap();

    // Both backups are the latest for their file, so both survive.
    assert_eq!(manager.backups_for(&a).len(), 1);
    assert_eq!(manager.backups_for(&b).len(), 1);

    manager.undo_last_change().unwrap();
    manager.undo_last_change().unwrap();
    assert_eq!(std::fs::read_to_string(&a).unwrap(), "a0\n");
    assert_eq!(std::fs::read_to_string(&b).unwrap(), "b0\n");
}

#[test]
fn test_concurrent_changes_to_one_file_are_serialized() {
    let (_dir, file, manager) = setup(&ten_lines());
    let manager = Arc::new(manager);

    let handles: Vec<_> = (1..=10)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let file = file.clone();
            thread::spawn(move || {
                manager
                    .apply_change(&ChangeRequest::new(
                        &file,
                        i,
                        format!("line {i}"),
                        format!("LINE {i}"),
                    ))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected: String = (1..=10).map(|i| format!("LINE {i}\n")).collect();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), expected);
    assert_eq!(manager.get_summary().applied, 10);
}

#[test]
fn test_summary_tracks_affected_files() {
    let (_dir, file, manager) = setup("a\nb\n");
    manager
        .apply_change(&ChangeRequest::new(&file, 1, "a", "A"))
        .unwrap();
    manager.reject_change(&ChangeRequest::new(&file, 2, "b", "B"));
    let _ = manager.apply_change(&ChangeRequest::new(&file, 2, "nope", "B"));

    let summary = manager.get_summary();
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.failed, 1);
    assert!(summary.affected_files.contains(&file));

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["applied"], 1);
}

/// Holds the first backup write of `a.py` until released.
struct SlowBackups {
    inner: MemoryFileAccess,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl FileAccess for SlowBackups {
    fn read(&self, path: &Path) -> io::Result<String> {
        self.inner.read(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let is_a_backup = path.starts_with("/backups")
            && path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("a.py."));
        if is_a_backup {
            let entered = self.entered.lock().unwrap().take();
            if let Some(tx) = entered {
                tx.send(()).unwrap();
                let _ = self
                    .release
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(3));
            }
        }
        self.inner.write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.inner.remove(path)
    }
}

#[test]
fn test_slow_backup_does_not_block_other_files() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let files = Arc::new(SlowBackups {
        inner: MemoryFileAccess::new()
            .with_file("a.py", "a\n")
            .with_file("b.py", "b\n"),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
    });
    let manager = Arc::new(CodeChangeManager::with_file_access(
        ChangeConfig::with_backup_dir("/backups"),
        files.clone(),
    ));

    let slow = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            manager
                .apply_change(&ChangeRequest::new("a.py", 1, "a", "A"))
                .unwrap();
        })
    };
    entered_rx.recv_timeout(Duration::from_secs(3)).unwrap();

    let started = Instant::now();
    manager
        .apply_change(&ChangeRequest::new("b.py", 1, "b", "B"))
        .unwrap();
    let elapsed = started.elapsed();

    release_tx.send(()).unwrap();
    slow.join().unwrap();

    assert!(elapsed < Duration::from_secs(1), "b.py waited {elapsed:?}");
    assert_eq!(files.inner.contents(Path::new("a.py")).as_deref(), Some("A\n"));
    assert_eq!(files.inner.contents(Path::new("b.py")).as_deref(), Some("B\n"));
    assert_eq!(manager.get_summary().applied, 2);
}
