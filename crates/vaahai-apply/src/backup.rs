//! Backup store with FIFO retention.
//!
//! Every backup is a full copy of the file contents taken before a write.
//! Names combine the file name, a short hash of the full path, a timestamp
//! and a sequence number, so two files called `main.py` never collide and
//! ordering survives clock ties.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vaahai_core::files::FileAccess;

use crate::error::{ChangeError, ChangeResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub file_path: PathBuf,
    pub backup_path: PathBuf,
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

pub fn digest_of(contents: &str) -> String {
    hex::encode(Sha256::digest(contents.as_bytes()))
}

#[derive(Debug)]
pub struct BackupStore {
    dir: PathBuf,
    max_backups: usize,
    /// Oldest first.
    entries: Vec<BackupEntry>,
    next_seq: u64,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            max_backups,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    /// Backups of `file_path`, oldest first.
    pub fn for_file(&self, file_path: &Path) -> Vec<BackupEntry> {
        self.entries
            .iter()
            .filter(|e| e.file_path == file_path)
            .cloned()
            .collect()
    }

    pub fn latest_for(&self, file_path: &Path) -> Option<&BackupEntry> {
        self.entries.iter().rev().find(|e| e.file_path == file_path)
    }

    /// Reserve the next backup path for `file_path`. Touches no files.
    pub fn next_backup_path(&mut self, file_path: &Path) -> PathBuf {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.dir.join(backup_name(file_path, Utc::now(), seq))
    }

    /// Write `contents` to a reserved `backup_path`. The entry is not tracked
    /// until passed to [`BackupStore::record`].
    pub fn write_backup(
        files: &dyn FileAccess,
        file_path: &Path,
        backup_path: PathBuf,
        contents: &str,
    ) -> ChangeResult<BackupEntry> {
        if let Some(dir) = backup_path.parent() {
            files
                .create_dir_all(dir)
                .map_err(|e| ChangeError::file_access(dir, e))?;
        }
        files
            .write(&backup_path, contents)
            .map_err(|e| ChangeError::file_access(&backup_path, e))?;

        tracing::debug!(
            file = %file_path.display(),
            backup = %backup_path.display(),
            "backup created"
        );
        Ok(BackupEntry {
            file_path: file_path.to_path_buf(),
            backup_path,
            digest: digest_of(contents),
            created_at: Utc::now(),
        })
    }

    pub fn record(&mut self, entry: BackupEntry) {
        self.entries.push(entry);
    }

    /// Reserve, write and record in one call.
    pub fn create(
        &mut self,
        files: &dyn FileAccess,
        file_path: &Path,
        contents: &str,
    ) -> ChangeResult<BackupEntry> {
        let backup_path = loop {
            let candidate = self.next_backup_path(file_path);
            if !files.exists(&candidate) {
                break candidate;
            }
        };
        let entry = Self::write_backup(files, file_path, backup_path, contents)?;
        self.record(entry.clone());
        Ok(entry)
    }

    /// Read a backup back and check it against its recorded digest.
    pub fn read_verified(
        files: &dyn FileAccess,
        backup_path: &Path,
        digest: Option<&str>,
    ) -> ChangeResult<String> {
        let contents = files
            .read(backup_path)
            .map_err(|e| ChangeError::file_access(backup_path, e))?;
        if let Some(expected) = digest {
            if digest_of(&contents) != expected {
                return Err(ChangeError::file_access(
                    backup_path,
                    io::Error::new(io::ErrorKind::InvalidData, "backup digest mismatch"),
                ));
            }
        }
        Ok(contents)
    }

    /// Untrack the oldest backups until the store is within `max_backups`.
    ///
    /// Paths in `protected` are never evicted, so the store may stay over the
    /// limit. Returns the evicted backup paths, oldest first; deleting them is
    /// left to [`BackupStore::remove_files`].
    pub fn enforce_retention(&mut self, protected: &HashSet<PathBuf>) -> Vec<PathBuf> {
        let mut evicted = Vec::new();
        if self.max_backups == 0 {
            return evicted;
        }

        while self.entries.len() > self.max_backups {
            let Some(pos) = self
                .entries
                .iter()
                .position(|e| !protected.contains(&e.backup_path))
            else {
                break;
            };
            evicted.push(self.entries.remove(pos).backup_path);
        }
        evicted
    }

    /// Delete evicted backup files. Already-missing files are fine.
    pub fn remove_files(files: &dyn FileAccess, paths: &[PathBuf]) {
        for path in paths {
            match files.remove(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        backup = %path.display(),
                        error = %e,
                        "failed to delete evicted backup"
                    );
                }
            }
        }
    }

    /// Forget every entry. Files on disk are left alone.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn backup_name(file_path: &Path, created_at: DateTime<Utc>, seq: u64) -> String {
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let path_hash = digest_of(&file_path.to_string_lossy());
    format!(
        "{file_name}.{}.{}.{seq:06}.bak",
        &path_hash[..8],
        created_at.format("%Y%m%dT%H%M%S%.6fZ")
    )
}
