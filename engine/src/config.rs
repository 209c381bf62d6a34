//! Engine configuration.
//!
//! Defaults are usable as-is; a TOML file can override any field:
//!
//! ```toml
//! scratch_root = "/var/tmp/saison"
//! compression = "deflated"
//! checksum = "blake3"
//! pretty_json = false
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::checksums::ChecksumAlgorithm;
use crate::error::BackupError;

/// How archive entries are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    Stored,
    #[default]
    Deflated,
}

impl ArchiveCompression {
    pub(crate) fn method(&self) -> zip::CompressionMethod {
        match self {
            Self::Stored => zip::CompressionMethod::Stored,
            Self::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent directory for scratch directories; the OS temp dir when unset
    pub scratch_root: Option<PathBuf>,
    pub compression: ArchiveCompression,
    /// Digest reported for every written backup
    pub checksum: ChecksumAlgorithm,
    /// Indent JSON payloads
    pub pretty_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            scratch_root: None,
            compression: ArchiveCompression::Deflated,
            checksum: ChecksumAlgorithm::Sha256,
            pretty_json: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, BackupError> {
        toml::from_str(text).map_err(|e| BackupError::Validation(format!("invalid config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, BackupError> {
        let text = std::fs::read_to_string(path).map_err(|e| BackupError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }
}
