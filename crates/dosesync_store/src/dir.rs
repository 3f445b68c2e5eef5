//! Data directory management.
//!
//! The LOCK file ensures only one host process owns the documents at a
//! time. Document files are named after their [`DocumentKind`].

use crate::error::{StoreError, StoreResult};
use dosesync_protocol::DocumentKind;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
/// Suffix of in-progress writes.
const TEMP_SUFFIX: &str = ".tmp";

/// Owns the data directory and its advisory lock.
///
/// The lock is released when the `DataDir` is dropped.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens a data directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns [`StoreError::Locked`])
    /// - I/O errors occur
    pub fn open(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the backing file of a document.
    #[must_use]
    pub fn document_path(&self, kind: DocumentKind) -> PathBuf {
        self.path.join(kind.file_name())
    }

    /// Returns a fresh temp path for a write of `kind`.
    ///
    /// Every call yields a distinct name so concurrent writers never share
    /// a temp file.
    #[must_use]
    pub fn temp_path(&self, kind: DocumentKind) -> PathBuf {
        self.path.join(format!(
            ".{}.{}{}",
            kind.file_name(),
            uuid::Uuid::new_v4().simple(),
            TEMP_SUFFIX
        ))
    }

    /// Syncs the directory so a completed rename survives a crash.
    #[cfg(unix)]
    pub(crate) fn sync(&self) -> StoreResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    /// NTFS journals metadata; directory handles cannot be fsynced on Windows.
    #[cfg(not(unix))]
    pub(crate) fn sync(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Lists leftover temp files, e.g. from a crash mid-write.
    pub fn stale_temp_files(&self) -> StoreResult<Vec<PathBuf>> {
        let mut stale = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX));
            if is_temp {
                stale.push(path);
            }
        }
        Ok(stale)
    }
}
