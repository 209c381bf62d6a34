//! Progress reporting trait.
//!
//! This module defines the BackupProgress trait, which decouples the engine
//! from whatever front end drives it (CLI, GUI, automation).

use std::fmt;

use crate::model::RecordType;

/// The facade operation a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ExportSingle,
    ExportSelected,
    ImportSingle,
    ImportArchive,
    Preview,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ExportSingle => write!(f, "export"),
            Operation::ExportSelected => write!(f, "archive export"),
            Operation::ImportSingle => write!(f, "import"),
            Operation::ImportArchive => write!(f, "archive import"),
            Operation::Preview => write!(f, "preview"),
        }
    }
}

/// Trait for receiving progress updates from a backup operation.
///
/// Callbacks run synchronously on the task executing the operation, so
/// implementations should return quickly.
pub trait BackupProgress: Send + Sync {
    /// Called when the operation starts.
    fn on_started(&self, operation: Operation);

    /// Called after one record type has been encoded, restored or counted.
    ///
    /// `count` is the number of records written, inserted or discovered.
    fn on_type_processed(&self, operation: Operation, record_type: RecordType, count: usize);

    /// Called when the operation finishes successfully.
    fn on_completed(&self, operation: Operation);
}
