//! Backup facade: the operations the application calls.
//!
//! This module coordinates the codec, classifier, duplicate oracle and
//! archive container with the host's entity stores:
//! - Exporting one record type to a JSON file
//! - Exporting a selection of record types to a zip archive
//! - Importing a JSON file or an archive without creating duplicates
//! - Previewing an import without touching any store
//!
//! Every operation returns `Result<_, BackupError>`; nothing below this layer
//! escapes as anything else. The facade holds no mutable state of its own, so
//! operations on distinct paths can run concurrently.

use chrono::Local;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::archive;
use crate::checksums::{self, ChecksumValue};
use crate::classifier;
use crate::codec;
use crate::config::EngineConfig;
use crate::dedup::{DuplicateOracle, Fingerprint};
use crate::error::BackupError;
use crate::fs_ops;
use crate::model::{
    archive_file_name, BackupSelection, ExportSummary, ImportPreview, RecordType, RestoreSummary,
};
use crate::preview;
use crate::progress::{BackupProgress, Operation};
use crate::records::with_record;
use crate::stores::{ChangeListener, FlagStore, StoreSet, StoredRecord};

/// Prefix of the persisted last-used selection keys.
pub const SELECTION_KEY_PREFIX: &str = "backup_select_";

/// Persisted key recording whether `ty` was selected for the last export.
pub fn selection_key(ty: RecordType) -> String {
    format!("{}{}", SELECTION_KEY_PREFIX, ty.slug())
}

/// Entry point for backup export, import and preview.
pub struct BackupFacade {
    stores: StoreSet,
    flags: Arc<dyn FlagStore>,
    listener: Option<Arc<dyn ChangeListener>>,
    progress: Option<Arc<dyn BackupProgress>>,
    config: EngineConfig,
}

impl BackupFacade {
    pub fn new(stores: StoreSet, flags: Arc<dyn FlagStore>) -> Self {
        BackupFacade {
            stores,
            flags,
            listener: None,
            progress: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn BackupProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    pub fn flags(&self) -> &Arc<dyn FlagStore> {
        &self.flags
    }

    /// The last-used export selection. Types never recorded default to enabled.
    pub fn selection(&self) -> Result<BackupSelection, BackupError> {
        let flags = self.flags.load().map_err(|e| {
            BackupError::Validation(format!("failed to load backup selection: {}", e))
        })?;
        let mut selection = BackupSelection::all();
        for ty in RecordType::ALL {
            if let Some(enabled) = flags.get(&selection_key(ty)) {
                selection.set(ty, *enabled);
            }
        }
        Ok(selection)
    }

    /// Persist `selection` as the last-used export selection.
    ///
    /// Other flags share the store, so nothing is saved when the current
    /// flags cannot be loaded.
    pub fn set_selection(&self, selection: &BackupSelection) -> Result<(), BackupError> {
        let mut flags: HashMap<String, bool> = self.flags.load().map_err(|e| {
            BackupError::Validation(format!("failed to load backup selection: {}", e))
        })?;
        for ty in RecordType::ALL {
            flags.insert(selection_key(ty), selection.is_enabled(ty));
        }
        self.flags.save(&flags).map_err(|e| {
            BackupError::Validation(format!("failed to save backup selection: {}", e))
        })
    }

    /// Write every record of `record_type` to a JSON file.
    ///
    /// When `destination` is an existing directory the canonical file name is
    /// used inside it.
    pub async fn export_single(
        &self,
        record_type: RecordType,
        destination: &Path,
    ) -> Result<ExportSummary, BackupError> {
        let operation = Operation::ExportSingle;
        self.started(operation);

        let (text, count) = with_record!(record_type, |R| self.encode_type::<R>().await?);
        self.type_processed(operation, record_type, count);

        let destination = resolve_destination(destination, || {
            record_type.file_name(Local::now().naive_local())
        });
        let size_bytes = fs_ops::write_guarded(&destination, text.as_bytes()).await?;
        let checksum = checksums::checksum_bytes(text.as_bytes(), self.config.checksum);

        info!(
            record_type = %record_type,
            records = count,
            destination = %destination.display(),
            "exported records"
        );
        self.completed(operation);
        Ok(ExportSummary {
            total_items: count,
            exported_types: vec![record_type],
            destination,
            size_bytes,
            checksum,
        })
    }

    /// Write every enabled record type into one archive.
    ///
    /// An empty selection is rejected before any store or file is touched.
    pub async fn export_selected(
        &self,
        selection: &BackupSelection,
        destination: &Path,
    ) -> Result<ExportSummary, BackupError> {
        if selection.is_empty() {
            return Err(BackupError::NothingSelected);
        }

        let operation = Operation::ExportSelected;
        self.started(operation);

        let exported_types = selection.enabled();
        let mut entries = BTreeMap::new();
        let mut total_items = 0;
        for ty in &exported_types {
            let (text, count) = with_record!(*ty, |R| self.encode_type::<R>().await?);
            entries.insert(ty.entry_name(), text);
            total_items += count;
            self.type_processed(operation, *ty, count);
        }

        let destination =
            resolve_destination(destination, || archive_file_name(Local::now().naive_local()));
        let size_bytes = archive::pack(&entries, &destination, &self.config).await?;
        let checksum: ChecksumValue =
            checksums::compute_file_checksum(&destination, self.config.checksum).await?;

        if let Err(e) = self.set_selection(selection) {
            warn!(error = %e, "failed to remember backup selection");
        }

        info!(
            types = exported_types.len(),
            records = total_items,
            destination = %destination.display(),
            "exported archive"
        );
        self.completed(operation);
        Ok(ExportSummary {
            total_items,
            exported_types,
            destination,
            size_bytes,
            checksum,
        })
    }

    /// Import one JSON file of a single record type.
    ///
    /// Without `declared_type` the type is inferred from the file's fields.
    /// An undeterminable type or undecodable content aborts the import with a
    /// format error before anything is inserted.
    pub async fn import_single(
        &self,
        source: &Path,
        declared_type: Option<RecordType>,
    ) -> Result<RestoreSummary, BackupError> {
        let operation = Operation::ImportSingle;
        self.started(operation);

        let text = fs_ops::read_text(source).await?;
        let record_type = match declared_type {
            Some(ty) => ty,
            None => classifier::classify(&text).ok_or_else(|| {
                BackupError::format(format!(
                    "could not determine the record type of {}",
                    source.display()
                ))
            })?,
        };

        let (imported, skipped) = with_record!(record_type, |R| {
            let candidates = codec::try_decode::<R>(&text)?;
            self.restore_records::<R>(candidates).await?
        });

        let mut summary = RestoreSummary::default();
        summary.record(record_type, imported, skipped);
        self.type_processed(operation, record_type, imported);

        info!(
            record_type = %record_type,
            imported,
            skipped,
            source = %source.display(),
            "imported file"
        );
        self.completed(operation);
        Ok(summary)
    }

    /// Import every backup entry found in an archive.
    ///
    /// Each entry is decoded, de-duplicated and inserted independently. An
    /// entry that fails to decode contributes nothing and is listed in
    /// `RestoreSummary::degraded_types`; absent entries are not an error.
    pub async fn import_archive(&self, source: &Path) -> Result<RestoreSummary, BackupError> {
        let operation = Operation::ImportArchive;
        self.started(operation);

        let unpacked = archive::unpack(source, &self.config).await?;
        let mut summary = RestoreSummary::default();

        for name in &unpacked.unreadable {
            if let Some(ty) = RecordType::from_entry_name(name) {
                summary.mark_degraded(ty);
            }
        }

        for ty in RecordType::ALL {
            let Some(text) = unpacked.entry(ty) else {
                continue;
            };

            let outcome = with_record!(ty, |R| match codec::try_decode::<R>(text) {
                Ok(candidates) => Some(self.restore_records::<R>(candidates).await?),
                Err(e) => {
                    warn!(record_type = %ty, error = %e, "skipping undecodable archive entry");
                    None
                }
            });

            match outcome {
                Some((imported, skipped)) => {
                    summary.record(ty, imported, skipped);
                    self.type_processed(operation, ty, imported);
                }
                None => summary.mark_degraded(ty),
            }
        }

        info!(
            imported = summary.total_imported(),
            skipped = summary.skipped_duplicates,
            degraded = summary.degraded_types.len(),
            source = %source.display(),
            "imported archive"
        );
        self.completed(operation);
        Ok(summary)
    }

    /// Describe what importing `source` would do, without inserting anything.
    pub async fn preview(&self, source: &Path) -> Result<ImportPreview, BackupError> {
        let operation = Operation::Preview;
        self.started(operation);
        let result = preview::preview(&self.stores, &self.config, source).await?;
        for (ty, count) in &result.counts {
            self.type_processed(operation, *ty, *count);
        }
        self.completed(operation);
        Ok(result)
    }

    async fn encode_type<T: StoredRecord>(&self) -> Result<(String, usize), BackupError> {
        let records = self
            .stores
            .get::<T>()
            .snapshot()
            .await
            .map_err(|e| BackupError::Store {
                record_type: T::RECORD_TYPE,
                source: e,
            })?;
        let text = codec::encode(&records, self.config.pretty_json)?;
        debug!(record_type = %T::RECORD_TYPE, records = records.len(), "encoded records");
        Ok((text, records.len()))
    }

    /// Insert every candidate not already present; returns (inserted, skipped).
    async fn restore_records<T: StoredRecord + Fingerprint>(
        &self,
        candidates: Vec<T>,
    ) -> Result<(usize, usize), BackupError> {
        let store = self.stores.get::<T>();
        let store_error = |e| BackupError::Store {
            record_type: T::RECORD_TYPE,
            source: e,
        };

        let existing = store.snapshot().await.map_err(store_error)?;
        let (fresh, skipped) = DuplicateOracle::new(&existing).partition(candidates);
        drop(existing);

        let inserted = store.insert_all(fresh).await.map_err(store_error)?.len();

        debug!(record_type = %T::RECORD_TYPE, inserted, skipped, "restored records");
        if inserted > 0 {
            self.notify_inserted(T::RECORD_TYPE, inserted);
        }
        Ok((inserted, skipped))
    }

    fn notify_inserted(&self, record_type: RecordType, count: usize) {
        if let Some(listener) = &self.listener {
            if let Err(e) = listener.records_inserted(record_type, count) {
                warn!(record_type = %record_type, error = %e, "change listener failed");
            }
        }
    }

    fn started(&self, operation: Operation) {
        if let Some(progress) = &self.progress {
            progress.on_started(operation);
        }
    }

    fn type_processed(&self, operation: Operation, record_type: RecordType, count: usize) {
        if let Some(progress) = &self.progress {
            progress.on_type_processed(operation, record_type, count);
        }
    }

    fn completed(&self, operation: Operation) {
        if let Some(progress) = &self.progress {
            progress.on_completed(operation);
        }
    }
}

fn resolve_destination(destination: &Path, default_name: impl FnOnce() -> String) -> PathBuf {
    if destination.is_dir() {
        destination.join(default_name())
    } else {
        destination.to_path_buf()
    }
}
