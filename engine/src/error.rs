//! Error types for the backup engine.
//!
//! `BackupError` is the only error that leaves the facade. Everything raised
//! underneath (filesystem, archive, codec, store) is converted into one of its
//! variants with the original cause kept as the `source()` for diagnostics.
//!
//! `StoreError` is what entity store collaborators return.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::RecordType;

/// Boxed cause carried by format errors.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a failure, used by callers to pick a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any I/O was attempted
    Validation,
    /// Source or destination could not be opened, read or written
    Io,
    /// Unrecognized or invalid backup content
    Format,
}

/// Errors returned by every facade operation.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Export requested with every record type switched off
    #[error("no record types selected for export")]
    NothingSelected,

    /// Input rejected before any I/O or store mutation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Failed to read a backup source
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write a backup destination or scratch file
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Scratch directory could not be created
    #[error("failed to create scratch directory")]
    Scratch(#[source] io::Error),

    /// The archive container itself is damaged or not a zip file
    #[error("invalid archive {}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Content could not be recognized or decoded
    #[error("unrecognized or invalid format: {reason}")]
    Format {
        reason: String,
        #[source]
        source: Option<Cause>,
    },

    /// An entity store failed while being read or written
    #[error("{record_type} store failed")]
    Store {
        record_type: RecordType,
        #[source]
        source: StoreError,
    },

    /// The operation was cancelled before it finished
    #[error("operation cancelled")]
    Cancelled,

    /// A background task ended without producing a result
    #[error("backup task failed: {0}")]
    TaskFailed(String),
}

impl BackupError {
    /// Build a format error without an underlying cause.
    pub fn format(reason: impl Into<String>) -> Self {
        Self::Format {
            reason: reason.into(),
            source: None,
        }
    }

    /// Build a format error that keeps the decoder's cause.
    pub fn format_with(reason: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::Format {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Classify this error into the validation / io / format taxonomy.
    ///
    /// A failed store read is reported as a validation failure, since the
    /// operation never reached its own I/O.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NothingSelected | Self::Validation(_) | Self::Store { .. } => {
                ErrorKind::Validation
            }
            Self::Read { .. }
            | Self::Write { .. }
            | Self::Scratch(_)
            | Self::Cancelled
            | Self::TaskFailed(_) => ErrorKind::Io,
            Self::Archive { .. } | Self::Format { .. } => ErrorKind::Format,
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } | Self::Scratch(source) => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}

/// Errors raised by entity store collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
