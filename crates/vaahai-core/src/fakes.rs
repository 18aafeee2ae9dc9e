//! In-memory fakes for the collaborators the core consumes (testing only).

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::files::FileAccess;

/// In-memory filesystem backed by a `BTreeMap<path, contents>`.
///
/// Writes to paths registered with [`MemoryFileAccess::fail_writes_to`] fail
/// with an I/O error, which lets tests exercise rollback paths.
#[derive(Debug, Default)]
pub struct MemoryFileAccess {
    files: Mutex<BTreeMap<PathBuf, String>>,
    failing_writes: Mutex<HashSet<PathBuf>>,
    unreadable: Mutex<HashSet<PathBuf>>,
}

impl MemoryFileAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), contents.into());
        self
    }

    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing_writes.lock().unwrap().insert(path.into());
    }

    pub fn allow_writes_to(&self, path: &Path) {
        self.failing_writes.lock().unwrap().remove(path);
    }

    pub fn make_unreadable(&self, path: impl Into<PathBuf>) {
        self.unreadable.lock().unwrap().insert(path.into());
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

impl FileAccess for MemoryFileAccess {
    fn read(&self, path: &Path) -> io::Result<String> {
        if self.unreadable.lock().unwrap().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("unreadable: {}", path.display()),
            ));
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if self.failing_writes.lock().unwrap().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("injected write failure: {}", path.display()),
            ));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}
