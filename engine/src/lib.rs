//! # Saison Backup Engine - Local Backup Export/Import Library
//!
//! A headless backup engine for the Saison scheduling application in Rust.
//! Designed as the foundation for multiple front ends (CLI, app shell, automation).
//!
//! ## Overview
//!
//! The engine exports the user's records to portable JSON files or a zip
//! archive and merges them back in without creating duplicates.
//! It features:
//! - One JSON array per record type, with field-signature type detection
//! - Merge-only import: records judged duplicate are skipped, never overwritten
//! - Tolerance for partially present or partially corrupt archives
//! - Dry-run preview before any store is touched
//! - Scoped cleanup of scratch files on success, failure and cancellation
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use saison_engine::{BackupFacade, BackupSelection, InMemoryFlagStore, StoreSet};
//!
//! # async fn demo() -> Result<(), saison_engine::BackupError> {
//! let facade = BackupFacade::new(StoreSet::in_memory(), Arc::new(InMemoryFlagStore::new()));
//!
//! // Export everything into one archive
//! let summary = facade
//!     .export_selected(&BackupSelection::all(), Path::new("/backups"))
//!     .await?;
//! println!("Wrote {} records to {}", summary.total_items, summary.destination.display());
//!
//! // Check what a restore would do, then run it
//! let preview = facade.preview(&summary.destination).await?;
//! println!("{} new, {} duplicates", preview.new_items, preview.duplicate_items);
//! let restored = facade.import_archive(&summary.destination).await?;
//! println!("Imported {} records", restored.total_imported());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Record types, selections and operation summaries
//! - **records**: Wire structs for every record type
//! - **codec**: JSON encode/decode of record lists
//! - **classifier**: Record type detection from field signatures
//! - **dedup**: Duplicate detection by identity and fingerprint
//! - **archive**: Zip container pack/unpack
//! - **preview**: Dry-run import counts
//! - **facade**: The export/import operations
//! - **semester**: Semester import conflicts and the first-run default semester
//! - **compat**: Interchangeability checks against other producers' backups
//! - **worker**: Background execution and cancellation
//! - **stores**: Collaborator traits and bundled store implementations
//! - **error**, **config**, **progress**, **checksums**, **fs_ops**: Supporting pieces

pub mod archive;
pub mod checksums;
pub mod classifier;
pub mod codec;
pub mod compat;
pub mod config;
pub mod dedup;
pub mod error;
pub mod facade;
pub mod fs_ops;
pub mod model;
pub mod preview;
pub mod progress;
pub mod records;
pub mod semester;
pub mod stores;
pub mod worker;

// Re-export main types and functions
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use compat::{check_source, cross_check, CompatibilityReport};
pub use config::{ArchiveCompression, EngineConfig};
pub use error::{BackupError, ErrorKind, StoreError};
pub use facade::{selection_key, BackupFacade};
pub use model::{
    BackupSelection, ExportSummary, ImportPreview, RecordType, RestoreSummary,
};
pub use progress::{BackupProgress, Operation};
pub use records::*;
pub use semester::{ConflictInfo, DefaultSemester, SemesterImportPlan};
pub use stores::{
    ChangeListener, EntityStore, FlagStore, InMemoryFlagStore, InMemoryStore, JsonFileStore,
    JsonFlagStore, StoreSet,
};
pub use worker::{spawn, BackupHandle, BackupTask, TaskOutcome};
