//! Dry-run import: counts what an import would insert and skip.
//!
//! Reads store snapshots but never calls `insert`. Entries that cannot be
//! classified or decoded count as zero instead of failing the preview.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::archive;
use crate::classifier;
use crate::codec;
use crate::config::EngineConfig;
use crate::dedup::{DuplicateOracle, Fingerprint};
use crate::error::BackupError;
use crate::fs_ops;
use crate::model::{ImportPreview, RecordType};
use crate::records::with_record;
use crate::stores::{StoreSet, StoredRecord};

/// Build an `ImportPreview` for `source`, which may be an archive or a
/// single-type JSON file.
pub async fn preview(
    stores: &StoreSet,
    config: &EngineConfig,
    source: &Path,
) -> Result<ImportPreview, BackupError> {
    let mut preview = ImportPreview::default();

    if archive::is_archive(source).await {
        preview.is_zip_file = true;
        let unpacked = archive::unpack(source, config).await?;
        for ty in RecordType::ALL {
            if let Some(text) = unpacked.entry(ty) {
                let (new_items, duplicates) =
                    with_record!(ty, |R| count_candidates::<R>(stores, text).await?);
                preview.add(ty, new_items, duplicates);
            }
        }
    } else {
        let text = fs_ops::read_text(source).await?;
        match classifier::classify(&text) {
            Some(ty) => {
                let (new_items, duplicates) =
                    with_record!(ty, |R| count_candidates::<R>(stores, &text).await?);
                preview.add(ty, new_items, duplicates);
            }
            None => warn!(source = %source.display(), "could not determine record type for preview"),
        }
    }

    info!(
        source = %source.display(),
        total = preview.total_items(),
        new_items = preview.new_items,
        duplicates = preview.duplicate_items,
        "previewed import"
    );
    Ok(preview)
}

async fn count_candidates<T: StoredRecord + Fingerprint>(
    stores: &StoreSet,
    text: &str,
) -> Result<(usize, usize), BackupError> {
    let candidates = codec::decode::<T>(text);
    if candidates.is_empty() {
        return Ok((0, 0));
    }

    let existing = stores
        .get::<T>()
        .snapshot()
        .await
        .map_err(|e| BackupError::Store {
            record_type: T::RECORD_TYPE,
            source: e,
        })?;
    let (fresh, duplicates) = DuplicateOracle::new(&existing).partition(candidates);
    debug!(
        record_type = %T::RECORD_TYPE,
        new_items = fresh.len(),
        duplicates,
        "counted preview candidates"
    );
    Ok((fresh.len(), duplicates))
}
