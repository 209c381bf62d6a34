//! Zip container holding up to eight named JSON payloads.
//!
//! Only the canonical entry names (`tasks.json`, `courses.json`, ...) are
//! written or read back; any subset in any order is valid. Both directions
//! stage their files in a scratch directory that is removed when the
//! operation ends, however it ends.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::config::EngineConfig;
use crate::error::BackupError;
use crate::fs_ops::{self, ScratchDir};
use crate::model::RecordType;

/// Leading bytes of a zip local file header.
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Contents recovered from an archive.
#[derive(Debug, Default)]
pub struct UnpackedArchive {
    /// Canonical entries keyed by entry name
    pub entries: BTreeMap<String, String>,
    /// Canonical entries whose bytes could not be read as text
    pub unreadable: Vec<String>,
    /// Entry names outside the canonical set, skipped
    pub ignored: Vec<String>,
}

impl UnpackedArchive {
    /// Text of the entry for `ty`, if the archive carried one.
    pub fn entry(&self, ty: RecordType) -> Option<&str> {
        self.entries.get(&ty.entry_name()).map(String::as_str)
    }

    /// Types the archive carried, in canonical order.
    pub fn record_types(&self) -> Vec<RecordType> {
        RecordType::ALL
            .into_iter()
            .filter(|ty| self.entry(*ty).is_some())
            .collect()
    }
}

/// Decide whether `path` holds an archive, by extension first and then by
/// sniffing the zip signature.
pub async fn is_archive(path: &Path) -> bool {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"));
    match by_extension {
        Some(true) => true,
        Some(false) if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) => {
            false
        }
        _ => sniff_zip(path).await,
    }
}

async fn sniff_zip(path: &Path) -> bool {
    use tokio::io::AsyncReadExt;

    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut header = [0u8; 4];
    matches!(file.read_exact(&mut header).await, Ok(_) if header == ZIP_MAGIC)
}

/// Pack `entries` into a zip archive at `destination`.
///
/// Every key must be a canonical entry name. Returns the archive size in bytes.
pub async fn pack(
    entries: &BTreeMap<String, String>,
    destination: &Path,
    config: &EngineConfig,
) -> Result<u64, BackupError> {
    if let Some(name) = entries
        .keys()
        .find(|name| RecordType::from_entry_name(name).is_none())
    {
        return Err(BackupError::Validation(format!(
            "'{}' is not a backup entry name",
            name
        )));
    }

    let scratch = ScratchDir::create(config.scratch_root.as_deref())?;

    for (name, text) in entries {
        let staged = scratch.join(name);
        tokio::fs::write(&staged, text)
            .await
            .map_err(|e| BackupError::Write {
                path: staged.clone(),
                source: e,
            })?;
    }

    let archive_path = scratch.join("archive.zip");
    let mut staged_entries = Vec::with_capacity(entries.len());
    for name in entries.keys() {
        let staged = scratch.join(name);
        let bytes = tokio::fs::read(&staged).await.map_err(|e| BackupError::Read {
            path: staged.clone(),
            source: e,
        })?;
        staged_entries.push((name.as_str(), bytes));
    }

    let options = FileOptions::default().compression_method(config.compression.method());
    let archive_bytes =
        build_zip(&staged_entries, options).map_err(|e| BackupError::Archive {
            path: archive_path.clone(),
            source: e,
        })?;

    tokio::fs::write(&archive_path, &archive_bytes)
        .await
        .map_err(|e| BackupError::Write {
            path: archive_path.clone(),
            source: e,
        })?;

    let size = fs_ops::copy_guarded(&archive_path, destination).await?;
    info!(
        destination = %destination.display(),
        entries = entries.len(),
        bytes = size,
        "packed archive"
    );
    Ok(size)
}

/// Unpack the canonical entries of the archive at `source`.
pub async fn unpack(source: &Path, config: &EngineConfig) -> Result<UnpackedArchive, BackupError> {
    let scratch = ScratchDir::create(config.scratch_root.as_deref())?;

    let local_copy = scratch.join("source.zip");
    tokio::fs::copy(source, &local_copy)
        .await
        .map_err(|e| BackupError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;
    let bytes = tokio::fs::read(&local_copy)
        .await
        .map_err(|e| BackupError::Read {
            path: local_copy.clone(),
            source: e,
        })?;

    let (contents, mut unpacked) =
        read_entries(bytes).map_err(|e| BackupError::Archive {
            path: source.to_path_buf(),
            source: e,
        })?;

    let mut extracted = Vec::with_capacity(contents.len());
    for (name, data) in contents {
        // Names are canonical, so they are safe to join onto the scratch path.
        let target = scratch.join(&name);
        tokio::fs::write(&target, &data)
            .await
            .map_err(|e| BackupError::Write {
                path: target.clone(),
                source: e,
            })?;
        extracted.push(name);
    }

    for name in extracted {
        match fs_ops::read_text(&scratch.join(&name)).await {
            Ok(text) => {
                unpacked.entries.insert(name, text);
            }
            Err(e) => {
                warn!(entry = %name, error = %e, "archive entry is not text");
                unpacked.unreadable.push(name);
            }
        }
    }

    info!(
        source = %source.display(),
        entries = unpacked.entries.len(),
        ignored = unpacked.ignored.len(),
        "unpacked archive"
    );
    Ok(unpacked)
}

fn build_zip(
    entries: &[(&str, Vec<u8>)],
    options: FileOptions,
) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(bytes)?;
        debug!(entry = %name, bytes = bytes.len(), "added archive entry");
    }
    Ok(zip.finish()?.into_inner())
}

/// Pull canonical entries out of an in-memory archive.
///
/// Unknown names and directories land in `ignored`; entries that fail to
/// decompress land in `unreadable`.
fn read_entries(
    bytes: Vec<u8>,
) -> Result<(Vec<(String, Vec<u8>)>, UnpackedArchive), zip::result::ZipError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut unpacked = UnpackedArchive::default();
    let mut contents = Vec::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_string();
        if file.is_dir() || RecordType::from_entry_name(&name).is_none() {
            debug!(entry = %name, "skipping non-backup archive entry");
            unpacked.ignored.push(name);
            continue;
        }

        let mut data = Vec::new();
        match file.read_to_end(&mut data) {
            Ok(_) => contents.push((name, data)),
            Err(e) => {
                warn!(entry = %name, error = %e, "failed to extract archive entry");
                unpacked.unreadable.push(name);
            }
        }
    }

    Ok((contents, unpacked))
}
