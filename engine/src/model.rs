//! Core data model for backup operations.
//!
//! This module defines the request/response values exchanged with the facade:
//! - RecordType: the eight categories a backup file or archive entry can hold
//! - BackupSelection: which record types an export should include
//! - ExportSummary, RestoreSummary, ImportPreview: per-call results
//!
//! None of these values outlive a single call; they are rebuilt every time.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::checksums::ChecksumValue;

/// File name prefix shared by every backup the engine writes.
pub const FILE_PREFIX: &str = "saison";

/// The fixed set of record categories a backup can contain.
///
/// Declaration order is the canonical order used for export listings and
/// summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    Tasks,
    Courses,
    Events,
    Routines,
    Subscriptions,
    TimerSessions,
    Semesters,
    Preferences,
}

impl RecordType {
    /// Every record type, in canonical order.
    pub const ALL: [RecordType; 8] = [
        RecordType::Tasks,
        RecordType::Courses,
        RecordType::Events,
        RecordType::Routines,
        RecordType::Subscriptions,
        RecordType::TimerSessions,
        RecordType::Semesters,
        RecordType::Preferences,
    ];

    /// Short name used in file names and selection keys.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Courses => "courses",
            Self::Events => "events",
            Self::Routines => "routines",
            Self::Subscriptions => "subscriptions",
            Self::TimerSessions => "pomodoro_sessions",
            Self::Semesters => "semesters",
            Self::Preferences => "preferences",
        }
    }

    /// Entry name inside an archive.
    pub fn entry_name(&self) -> String {
        format!("{}.json", self.slug())
    }

    /// Look up a record type by its archive entry name.
    pub fn from_entry_name(name: &str) -> Option<Self> {
        let slug = name.strip_suffix(".json")?;
        Self::ALL.into_iter().find(|ty| ty.slug() == slug)
    }

    /// Canonical single-file name: `saison_<slug>_<YYYYMMDD>_<HHMMSS>.json`.
    pub fn file_name(&self, at: NaiveDateTime) -> String {
        format!(
            "{}_{}_{}.json",
            FILE_PREFIX,
            self.slug(),
            at.format("%Y%m%d_%H%M%S")
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase().replace('-', "_");
        match lowered.as_str() {
            "timer_sessions" | "timers" | "pomodoro" => Ok(Self::TimerSessions),
            other => Self::ALL
                .into_iter()
                .find(|ty| ty.slug() == other)
                .ok_or_else(|| format!("Unknown record type '{}'", s)),
        }
    }
}

/// Canonical archive name: `saison_backup_<YYYYMMDD>_<HHMMSS>.zip`.
pub fn archive_file_name(at: NaiveDateTime) -> String {
    format!("{}_backup_{}.zip", FILE_PREFIX, at.format("%Y%m%d_%H%M%S"))
}

/// Which record types an export should include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSelection {
    flags: BTreeMap<RecordType, bool>,
}

impl BackupSelection {
    /// Selection with every record type enabled.
    pub fn all() -> Self {
        Self {
            flags: RecordType::ALL.iter().map(|ty| (*ty, true)).collect(),
        }
    }

    /// Selection with every record type disabled.
    pub fn none() -> Self {
        Self {
            flags: RecordType::ALL.iter().map(|ty| (*ty, false)).collect(),
        }
    }

    /// Selection enabling exactly the given types.
    pub fn only(types: &[RecordType]) -> Self {
        let mut selection = Self::none();
        for ty in types {
            selection.set(*ty, true);
        }
        selection
    }

    pub fn set(&mut self, ty: RecordType, enabled: bool) {
        self.flags.insert(ty, enabled);
    }

    pub fn with(mut self, ty: RecordType, enabled: bool) -> Self {
        self.set(ty, enabled);
        self
    }

    pub fn is_enabled(&self, ty: RecordType) -> bool {
        self.flags.get(&ty).copied().unwrap_or(false)
    }

    /// Enabled types in canonical order.
    pub fn enabled(&self) -> Vec<RecordType> {
        RecordType::ALL
            .into_iter()
            .filter(|ty| self.is_enabled(*ty))
            .collect()
    }

    /// True when no type is enabled; export refuses such a selection.
    pub fn is_empty(&self) -> bool {
        !self.flags.values().any(|enabled| *enabled)
    }
}

impl Default for BackupSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Number of records written across all types
    pub total_items: usize,
    /// Types written, in canonical order
    pub exported_types: Vec<RecordType>,
    /// Where the backup was written
    pub destination: PathBuf,
    /// Size of the written file in bytes
    pub size_bytes: u64,
    /// Digest of the written file
    pub checksum: ChecksumValue,
}

/// Result of an import: per-type insert counts plus skipped duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    imported: BTreeMap<RecordType, usize>,
    /// Records judged duplicate and skipped, across all types
    pub skipped_duplicates: usize,
    /// Archive entries that failed to decode and contributed nothing
    pub degraded_types: Vec<RecordType>,
}

impl RestoreSummary {
    /// Number of records of `ty` handed to the store.
    pub fn imported(&self, ty: RecordType) -> usize {
        self.imported.get(&ty).copied().unwrap_or(0)
    }

    /// Sum of all per-type counts.
    pub fn total_imported(&self) -> usize {
        self.imported.values().sum()
    }

    /// Per-type counts for every type that was present in the input.
    pub fn per_type(&self) -> &BTreeMap<RecordType, usize> {
        &self.imported
    }

    pub(crate) fn record(&mut self, ty: RecordType, imported: usize, skipped: usize) {
        *self.imported.entry(ty).or_insert(0) += imported;
        self.skipped_duplicates += skipped;
    }

    pub(crate) fn mark_degraded(&mut self, ty: RecordType) {
        self.imported.entry(ty).or_insert(0);
        if !self.degraded_types.contains(&ty) {
            self.degraded_types.push(ty);
        }
    }
}

/// Dry-run result describing what an import would do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPreview {
    /// Records discovered per type
    pub counts: BTreeMap<RecordType, usize>,
    /// Records that would be inserted
    pub new_items: usize,
    /// Records that would be skipped as duplicates
    pub duplicate_items: usize,
    /// True when the source is an archive rather than a single file
    pub is_zip_file: bool,
}

impl ImportPreview {
    pub fn total_items(&self) -> usize {
        self.counts.values().sum()
    }

    /// Types that contributed at least one record.
    pub fn record_types(&self) -> Vec<RecordType> {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(ty, _)| *ty)
            .collect()
    }

    pub(crate) fn add(&mut self, ty: RecordType, new_items: usize, duplicates: usize) {
        *self.counts.entry(ty).or_insert(0) += new_items + duplicates;
        self.new_items += new_items;
        self.duplicate_items += duplicates;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap()
    }

    #[test]
    fn test_entry_names() {
        assert_eq!(RecordType::TimerSessions.entry_name(), "pomodoro_sessions.json");
        assert_eq!(
            RecordType::from_entry_name("semesters.json"),
            Some(RecordType::Semesters)
        );
        assert_eq!(RecordType::from_entry_name("notes.json"), None);
        assert_eq!(RecordType::from_entry_name("tasks.txt"), None);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(archive_file_name(at()), "saison_backup_20240309_070501.zip");
        assert_eq!(
            RecordType::Courses.file_name(at()),
            "saison_courses_20240309_070501.json"
        );
    }

    #[test]
    fn test_record_type_from_str() {
        assert_eq!("Tasks".parse::<RecordType>(), Ok(RecordType::Tasks));
        assert_eq!("timer-sessions".parse::<RecordType>(), Ok(RecordType::TimerSessions));
        assert_eq!(
            "pomodoro_sessions".parse::<RecordType>(),
            Ok(RecordType::TimerSessions)
        );
        assert!("invoices".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_selection() {
        assert!(BackupSelection::none().is_empty());
        let selection = BackupSelection::none()
            .with(RecordType::Courses, true)
            .with(RecordType::Tasks, true);
        assert!(!selection.is_empty());
        assert_eq!(selection.enabled(), vec![RecordType::Tasks, RecordType::Courses]);
        assert_eq!(BackupSelection::all().enabled().len(), 8);
    }

    #[test]
    fn test_restore_summary_totals() {
        let mut summary = RestoreSummary::default();
        summary.record(RecordType::Tasks, 3, 1);
        summary.record(RecordType::Courses, 2, 0);
        summary.mark_degraded(RecordType::Events);
        assert_eq!(summary.imported(RecordType::Tasks), 3);
        assert_eq!(summary.imported(RecordType::Events), 0);
        assert_eq!(summary.total_imported(), 5);
        assert_eq!(summary.skipped_duplicates, 1);
        assert_eq!(summary.degraded_types, vec![RecordType::Events]);
    }
}
