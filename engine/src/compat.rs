//! Interchangeability checks between backups from different producers.
//!
//! A backup is judged on three independent axes plus an aggregate:
//! - file name matches the canonical archive or single-file pattern
//! - archive entry names are all canonical
//! - every entry's content decodes and round-trips through the codec
//!
//! Checks only read their sources.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::archive;
use crate::classifier;
use crate::codec;
use crate::config::EngineConfig;
use crate::error::BackupError;
use crate::fs_ops;
use crate::model::RecordType;
use crate::records::with_record;

fn archive_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^saison_backup_\d{8}_\d{6}\.zip$").expect("archive name pattern is valid")
    })
}

fn single_file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^saison_(tasks|courses|events|routines|subscriptions|pomodoro_sessions|semesters|preferences)_\d{8}_\d{6}\.json$",
        )
        .expect("single file name pattern is valid")
    })
}

/// Whether `name` is a canonical archive file name.
pub fn is_canonical_archive_name(name: &str) -> bool {
    archive_name_pattern().is_match(name)
}

/// Whether `name` is a canonical single-type file name.
pub fn is_canonical_file_name(name: &str) -> bool {
    single_file_name_pattern().is_match(name)
}

/// Record type named by a canonical single-type file name.
pub fn record_type_from_file_name(name: &str) -> Option<RecordType> {
    let captures = single_file_name_pattern().captures(name)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Outcome of a compatibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityReport {
    pub file_names: bool,
    pub entry_names: bool,
    pub contents: bool,
    /// True only when every other axis passed
    pub compatible: bool,
    /// One line per failed check
    pub problems: Vec<String>,
}

impl CompatibilityReport {
    fn new() -> Self {
        CompatibilityReport {
            file_names: true,
            entry_names: true,
            contents: true,
            compatible: true,
            problems: Vec::new(),
        }
    }

    fn fail_file_name(&mut self, problem: String) {
        self.file_names = false;
        self.problems.push(problem);
    }

    fn fail_entry_name(&mut self, problem: String) {
        self.entry_names = false;
        self.problems.push(problem);
    }

    fn fail_contents(&mut self, problem: String) {
        self.contents = false;
        self.problems.push(problem);
    }

    fn finish(mut self) -> Self {
        self.compatible = self.file_names && self.entry_names && self.contents;
        self
    }

    fn merge(mut self, other: CompatibilityReport, label: &str) -> Self {
        self.file_names &= other.file_names;
        self.entry_names &= other.entry_names;
        self.contents &= other.contents;
        self.problems
            .extend(other.problems.into_iter().map(|p| format!("{}: {}", label, p)));
        self
    }
}

/// Check one backup file along every axis.
///
/// Read failures are returned as errors; a damaged archive or undecodable
/// content is reported as a failed axis.
pub async fn check_source(
    source: &Path,
    config: &EngineConfig,
) -> Result<CompatibilityReport, BackupError> {
    let mut report = CompatibilityReport::new();
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    if archive::is_archive(source).await {
        if !is_canonical_archive_name(file_name) {
            report.fail_file_name(format!("'{}' is not a canonical archive name", file_name));
        }

        let unpacked = match archive::unpack(source, config).await {
            Ok(unpacked) => unpacked,
            Err(e @ BackupError::Archive { .. }) => {
                report.fail_contents(e.to_string());
                return Ok(report.finish());
            }
            Err(e) => return Err(e),
        };

        for name in &unpacked.ignored {
            report.fail_entry_name(format!("unexpected archive entry '{}'", name));
        }
        for name in &unpacked.unreadable {
            report.fail_contents(format!("entry '{}' could not be read", name));
        }
        for ty in RecordType::ALL {
            if let Some(text) = unpacked.entry(ty) {
                if let Err(problem) = check_content(ty, text) {
                    report.fail_contents(problem);
                }
            }
        }
    } else {
        if !is_canonical_file_name(file_name) {
            report.fail_file_name(format!("'{}' is not a canonical backup file name", file_name));
        }

        let text = match fs_ops::read_text(source).await {
            Ok(text) => text,
            Err(e @ BackupError::Format { .. }) => {
                report.fail_contents(e.to_string());
                return Ok(report.finish());
            }
            Err(e) => return Err(e),
        };
        // The canonical name already carries the type; an empty export has
        // no element to classify.
        let record_type =
            record_type_from_file_name(file_name).or_else(|| classifier::classify(&text));
        match record_type {
            Some(ty) => {
                if let Err(problem) = check_content(ty, &text) {
                    report.fail_contents(problem);
                }
            }
            None => report.fail_contents("record type could not be determined".to_string()),
        }
    }

    let report = report.finish();
    debug!(source = %source.display(), compatible = report.compatible, "checked backup source");
    Ok(report)
}

/// Check that two backups, typically ours and another producer's, both
/// conform; the combined report passes only if both do.
pub async fn cross_check(
    ours: &Path,
    theirs: &Path,
    config: &EngineConfig,
) -> Result<CompatibilityReport, BackupError> {
    let our_report = check_source(ours, config).await?;
    let their_report = check_source(theirs, config).await?;

    let report = CompatibilityReport::new()
        .merge(our_report, &display_name(ours))
        .merge(their_report, &display_name(theirs))
        .finish();
    info!(
        ours = %ours.display(),
        theirs = %theirs.display(),
        compatible = report.compatible,
        "cross-checked backups"
    );
    Ok(report)
}

fn check_content(ty: RecordType, text: &str) -> Result<(), String> {
    with_record!(ty, |R| {
        let records = codec::try_decode::<R>(text).map_err(|e| e.to_string())?;
        match codec::round_trips(&records) {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("{} records do not round-trip", ty)),
            Err(e) => Err(e.to_string()),
        }
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
