//! Backup-then-write editing of shared system files.
//!
//! A [`Snapshot`] copies the live file aside before it is rewritten. Until
//! [`Snapshot::commit`] succeeds, dropping the snapshot restores the live
//! file from that copy, so every failure path rolls back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hostnet_common::{HostnetError, HostnetResult};

/// File operations used when editing system files.
pub trait FileOps: Send + Sync {
    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Copy `from` over `to`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Replace the content of `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Delete `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// [`FileOps`] on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileOps for LocalFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Pre-edit copy of a live file; restores it on drop unless committed.
pub struct Snapshot<'a> {
    fs: &'a dyn FileOps,
    live: PathBuf,
    backup: PathBuf,
    released: bool,
}

impl<'a> Snapshot<'a> {
    /// Copy `live` to `backup`.
    ///
    /// # Errors
    ///
    /// Returns [`HostnetError::Backup`] if the copy fails; the live file has
    /// not been touched in that case.
    pub fn take(fs: &'a dyn FileOps, live: &Path, backup: &Path) -> HostnetResult<Self> {
        fs.copy(live, backup).map_err(|source| HostnetError::Backup {
            path: live.to_path_buf(),
            source,
        })?;
        tracing::trace!(live = %live.display(), backup = %backup.display(), "Snapshot taken");
        Ok(Self {
            fs,
            live: live.to_path_buf(),
            backup: backup.to_path_buf(),
            released: false,
        })
    }

    /// Write `contents` to the live file and discard the backup.
    ///
    /// # Errors
    ///
    /// Returns [`HostnetError::Commit`] if the write fails and the live file
    /// has been restored from the backup, or [`HostnetError::RestoreFailed`]
    /// if the restore failed as well.
    pub fn commit(mut self, contents: &str) -> HostnetResult<()> {
        if let Err(source) = self.fs.write(&self.live, contents) {
            let path = self.live.clone();
            return Err(if self.restore() {
                HostnetError::Commit { path, source }
            } else {
                HostnetError::RestoreFailed {
                    path,
                    backup: self.backup.clone(),
                    source,
                }
            });
        }

        self.released = true;
        if let Err(e) = self.fs.remove(&self.backup) {
            tracing::warn!(backup = %self.backup.display(), error = %e, "Cannot remove backup");
        }
        Ok(())
    }

    /// Copy the backup over the live file; `false` if that failed.
    fn restore(&mut self) -> bool {
        self.released = true;
        match self.fs.copy(&self.backup, &self.live) {
            Ok(()) => {
                tracing::debug!(live = %self.live.display(), "Restored from backup");
                true
            }
            Err(e) => {
                tracing::error!(
                    live = %self.live.display(),
                    backup = %self.backup.display(),
                    error = %e,
                    "Cannot restore from backup"
                );
                false
            }
        }
    }
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.restore();
        }
    }
}

/// Replace `live` with `contents`, keeping `backup` until the write succeeds.
///
/// # Errors
///
/// Returns [`HostnetError::Backup`] or [`HostnetError::Commit`], in both
/// cases with the live file holding its original content, or
/// [`HostnetError::RestoreFailed`] when only the backup still has it.
pub fn commit_with_backup(
    fs: &dyn FileOps,
    live: &Path,
    backup: &Path,
    contents: &str,
) -> HostnetResult<()> {
    Snapshot::take(fs, live, backup)?.commit(contents)
}
