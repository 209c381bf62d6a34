//! Filesystem helpers with scoped cleanup.
//!
//! This module provides:
//! - Scratch directories removed when their guard drops
//! - Destinations staged in a temp file and moved into place only when complete
//! - Parent directory creation and text reads mapped to `BackupError`
//!
//! Guards release their resource in `Drop`, so success, early return through
//! `?`, and cancellation of the owning future all clean up the same way.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::BackupError;

/// A scratch directory that exists for the lifetime of one operation.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a scratch directory under `root`, or the OS temp dir.
    pub fn create(root: Option<&Path>) -> Result<Self, BackupError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("saison-backup-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(BackupError::Scratch)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(BackupError::Scratch)?;
        debug!(path = %dir.path().display(), "created scratch directory");
        Ok(ScratchDir { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// A destination written through a temp file in the same directory.
///
/// The temp file is created and opened synchronously, so every byte written
/// later lands in that inode. Dropped without `commit`, the temp path is
/// unlinked and the destination is never created. A blocking-pool write still
/// in flight after cancellation can only reach the unlinked inode.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl StagedFile {
    pub fn new(destination: &Path) -> Result<Self, BackupError> {
        ensure_parent_dir_exists(destination)?;
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".saison-partial-")
            .tempfile_in(dir)
            .map_err(|e| BackupError::Write {
                path: destination.to_path_buf(),
                source: e,
            })?;
        Ok(StagedFile {
            temp,
            destination: destination.to_path_buf(),
        })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// An async handle onto the staged inode.
    pub fn writer(&self) -> Result<tokio::fs::File, BackupError> {
        let file = self.temp.as_file().try_clone().map_err(|e| self.write_error(e))?;
        Ok(tokio::fs::File::from_std(file))
    }

    /// Move the staged file onto the destination.
    pub fn commit(self) -> Result<(), BackupError> {
        let destination = self.destination;
        self.temp.persist(&destination).map_err(|e| BackupError::Write {
            path: destination.clone(),
            source: e.error,
        })?;
        debug!(path = %destination.display(), "committed destination");
        Ok(())
    }

    fn write_error(&self, source: io::Error) -> BackupError {
        BackupError::Write {
            path: self.destination.clone(),
            source,
        }
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), BackupError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match std::fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(BackupError::Write {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            std::fs::create_dir_all(parent).map_err(|e| BackupError::Write {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(BackupError::Write {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// Write `contents` to `destination`; nothing appears there unless the write
/// completes.
pub async fn write_guarded(destination: &Path, contents: &[u8]) -> Result<u64, BackupError> {
    let staged = StagedFile::new(destination)?;
    let mut file = staged.writer()?;
    file.write_all(contents)
        .await
        .map_err(|e| staged.write_error(e))?;
    file.flush().await.map_err(|e| staged.write_error(e))?;
    drop(file);
    staged.commit()?;
    Ok(contents.len() as u64)
}

/// Copy a finished file to `destination`; nothing appears there unless the
/// copy completes.
pub async fn copy_guarded(source: &Path, destination: &Path) -> Result<u64, BackupError> {
    let mut input = tokio::fs::File::open(source)
        .await
        .map_err(|e| BackupError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;
    let staged = StagedFile::new(destination)?;
    let mut file = staged.writer()?;
    let bytes = tokio::io::copy(&mut input, &mut file)
        .await
        .map_err(|e| staged.write_error(e))?;
    file.flush().await.map_err(|e| staged.write_error(e))?;
    drop(file);
    staged.commit()?;
    Ok(bytes)
}

/// Read a UTF-8 backup file.
pub async fn read_text(path: &Path) -> Result<String, BackupError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| BackupError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    String::from_utf8(bytes).map_err(|e| {
        BackupError::format_with(format!("{} is not UTF-8 text", path.display()), e)
    })
}
