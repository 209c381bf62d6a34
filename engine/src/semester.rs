//! Semester import inspection and first-run default semester creation.

use chrono::NaiveDate;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::BackupError;
use crate::facade::BackupFacade;
use crate::fs_ops;
use crate::model::RecordType;
use crate::records::Semester;
use crate::stores::{EntityStore, FlagStore};

/// Flag recording that the first-run default semester has been handled.
pub const DEFAULT_SEMESTER_FLAG: &str = "default_semester_created";

/// Which parts of an incoming semester collide with the effective one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictInfo {
    pub name_conflict: bool,
    pub period_conflict: bool,
    pub display_conflict: bool,
}

impl ConflictInfo {
    /// Compare `incoming` against the currently effective semester.
    pub fn between(incoming: &Semester, current: Option<&Semester>) -> Self {
        let Some(current) = current else {
            return ConflictInfo::default();
        };
        ConflictInfo {
            name_conflict: incoming.name.trim().to_lowercase() == current.name.trim().to_lowercase(),
            period_conflict: incoming.period_settings != current.period_settings,
            display_conflict: incoming.display_settings != current.display_settings,
        }
    }

    pub fn has_conflict(&self) -> bool {
        self.name_conflict || self.period_conflict || self.display_conflict
    }
}

/// The semester flagged current, or else the one starting last.
pub fn effective_semester(semesters: &[Semester]) -> Option<&Semester> {
    semesters
        .iter()
        .find(|s| s.is_current)
        .or_else(|| semesters.iter().max_by_key(|s| s.start_date))
}

/// What importing a semesters file would collide with.
#[derive(Debug, Clone, PartialEq)]
pub struct SemesterImportPlan {
    /// First semester found in the file
    pub incoming: Semester,
    /// The effective semester it was compared against
    pub current: Option<Semester>,
    pub conflicts: ConflictInfo,
}

impl BackupFacade {
    /// Decode a semesters file and compare it with the effective semester.
    ///
    /// Nothing is inserted; the caller decides how to resolve conflicts and
    /// then runs `import_single`.
    pub async fn inspect_semester_import(
        &self,
        source: &Path,
    ) -> Result<SemesterImportPlan, BackupError> {
        let text = fs_ops::read_text(source).await?;
        let incoming = codec::decode::<Semester>(&text)
            .into_iter()
            .next()
            .ok_or_else(|| BackupError::Validation("no recognizable semester data".to_string()))?;

        let existing = self
            .stores()
            .semesters
            .snapshot()
            .await
            .map_err(|e| BackupError::Store {
                record_type: RecordType::Semesters,
                source: e,
            })?;
        let current = effective_semester(&existing).cloned();
        let conflicts = ConflictInfo::between(&incoming, current.as_ref());

        debug!(
            semester = %incoming.name,
            name_conflict = conflicts.name_conflict,
            period_conflict = conflicts.period_conflict,
            display_conflict = conflicts.display_conflict,
            "inspected semester import"
        );
        Ok(SemesterImportPlan {
            incoming,
            current,
            conflicts,
        })
    }

    /// A first-run guard over this facade's semester store and flags.
    pub fn default_semester(&self) -> DefaultSemester {
        DefaultSemester::new(self.stores().semesters.clone(), self.flags().clone())
    }
}

/// Creates the default semester at most once.
///
/// A persisted flag answers the common case without locking. Callers that
/// miss it serialize on a mutex and re-check the store before inserting.
pub struct DefaultSemester {
    store: Arc<dyn EntityStore<Semester>>,
    flags: Arc<dyn FlagStore>,
    done: AtomicBool,
    create_lock: tokio::sync::Mutex<()>,
}

impl DefaultSemester {
    pub fn new(store: Arc<dyn EntityStore<Semester>>, flags: Arc<dyn FlagStore>) -> Self {
        DefaultSemester {
            store,
            flags,
            done: AtomicBool::new(false),
            create_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Make sure a semester exists, creating one starting `today` if none does.
    ///
    /// Returns true only for the call that inserted it.
    pub async fn ensure_default(&self, today: NaiveDate) -> Result<bool, BackupError> {
        if self.is_marked() {
            return Ok(false);
        }

        let _guard = self.create_lock.lock().await;
        if self.is_marked() {
            return Ok(false);
        }

        let store_error = |e| BackupError::Store {
            record_type: RecordType::Semesters,
            source: e,
        };
        let existing = self.store.snapshot().await.map_err(store_error)?;
        let created = if existing.is_empty() {
            let id = self
                .store
                .insert(Semester::default_starting(today))
                .await
                .map_err(store_error)?;
            info!(id, start = %today, "created default semester");
            true
        } else {
            false
        };

        self.mark();
        Ok(created)
    }

    fn is_marked(&self) -> bool {
        if self.done.load(Ordering::Acquire) {
            return true;
        }
        let persisted = match self.flags.load() {
            Ok(flags) => flags.get(DEFAULT_SEMESTER_FLAG).copied().unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "failed to read default semester flag");
                false
            }
        };
        if persisted {
            self.done.store(true, Ordering::Release);
        }
        persisted
    }

    fn mark(&self) {
        self.done.store(true, Ordering::Release);
        // Saving a map we could not read would drop every other flag.
        let mut flags = match self.flags.load() {
            Ok(flags) => flags,
            Err(e) => {
                warn!(error = %e, "failed to read flags, default semester flag not persisted");
                return;
            }
        };
        flags.insert(DEFAULT_SEMESTER_FLAG.to_string(), true);
        if let Err(e) = self.flags.save(&flags) {
            warn!(error = %e, "failed to persist default semester flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{DisplaySettings, PeriodSettings};
    use crate::error::StoreError;
    use crate::stores::{InMemoryFlagStore, InMemoryStore, StoreSet};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// Flag store whose reads fail; counts attempted writes.
    #[derive(Default)]
    struct UnreadableFlagStore {
        saves: AtomicUsize,
    }

    impl FlagStore for UnreadableFlagStore {
        fn load(&self) -> Result<HashMap<String, bool>, StoreError> {
            Err(StoreError::Unavailable("preferences locked".to_string()))
        }

        fn save(&self, _flags: &HashMap<String, bool>) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn semester(name: &str, start: NaiveDate, is_current: bool) -> Semester {
        Semester {
            is_current,
            name: name.to_string(),
            ..Semester::default_starting(start)
        }
    }

    #[test]
    fn test_conflicts_against_nothing() {
        let incoming = semester("Fall", date(9, 1), false);
        assert!(!ConflictInfo::between(&incoming, None).has_conflict());
    }

    #[test]
    fn test_name_conflict_ignores_case_and_whitespace() {
        let incoming = semester("  fall 2024 ", date(9, 1), false);
        let current = semester("Fall 2024", date(9, 2), true);
        let conflicts = ConflictInfo::between(&incoming, Some(&current));
        assert!(conflicts.name_conflict);
        assert!(!conflicts.period_conflict);
        assert!(!conflicts.display_conflict);
    }

    #[test]
    fn test_settings_conflicts() {
        let mut incoming = semester("Spring", date(2, 1), false);
        incoming.period_settings = PeriodSettings {
            periods_per_day: 12,
            ..PeriodSettings::default()
        };
        incoming.display_settings = DisplaySettings {
            show_weekends: true,
            ..DisplaySettings::default()
        };
        let current = semester("Fall", date(9, 1), true);

        let conflicts = ConflictInfo::between(&incoming, Some(&current));
        assert_eq!(
            conflicts,
            ConflictInfo {
                name_conflict: false,
                period_conflict: true,
                display_conflict: true,
            }
        );
    }

    #[test]
    fn test_effective_semester_prefers_current_flag() {
        let semesters = vec![
            semester("old", date(1, 1), true),
            semester("new", date(9, 1), false),
        ];
        assert_eq!(effective_semester(&semesters).unwrap().name, "old");

        let semesters = vec![
            semester("old", date(1, 1), false),
            semester("new", date(9, 1), false),
        ];
        assert_eq!(effective_semester(&semesters).unwrap().name, "new");
        assert!(effective_semester(&[]).is_none());
    }

    #[tokio::test]
    async fn test_inspect_rejects_file_without_semesters() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("semesters.json");
        std::fs::write(&source, "[]").unwrap();

        let facade = BackupFacade::new(StoreSet::in_memory(), Arc::new(InMemoryFlagStore::new()));
        let err = facade.inspect_semester_import(&source).await.unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)));
    }

    #[tokio::test]
    async fn test_inspect_reports_conflicts_without_inserting() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut stores = StoreSet::in_memory();
        stores.semesters = Arc::new(InMemoryStore::with_records(vec![Semester {
            id: Some(1),
            ..semester("Fall 2024", date(9, 1), true)
        }]));
        let facade = BackupFacade::new(stores, Arc::new(InMemoryFlagStore::new()));

        let source = temp_dir.path().join("semesters.json");
        let incoming = [semester("FALL 2024", date(9, 2), false)];
        std::fs::write(&source, codec::encode(&incoming, true).unwrap()).unwrap();

        let plan = facade.inspect_semester_import(&source).await.expect("Failed to inspect");
        assert!(plan.conflicts.name_conflict);
        assert_eq!(plan.current.as_ref().map(|s| s.id), Some(Some(1)));
        assert_eq!(facade.stores().semesters.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_default_runs_once_under_contention() {
        let store: Arc<InMemoryStore<Semester>> = Arc::new(InMemoryStore::new());
        let flags = Arc::new(InMemoryFlagStore::new());
        let guard = Arc::new(DefaultSemester::new(store.clone(), flags.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.ensure_default(date(9, 1)).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(flags.load().unwrap().get(DEFAULT_SEMESTER_FLAG), Some(&true));
    }

    #[tokio::test]
    async fn test_ensure_default_respects_persisted_flag() {
        let store: Arc<InMemoryStore<Semester>> = Arc::new(InMemoryStore::new());
        let flags = Arc::new(InMemoryFlagStore::new());
        let mut persisted = HashMap::new();
        persisted.insert(DEFAULT_SEMESTER_FLAG.to_string(), true);
        flags.save(&persisted).unwrap();

        let guard = DefaultSemester::new(store.clone(), flags);
        assert!(!guard.ensure_default(date(9, 1)).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_default_skips_existing_semesters() {
        let store = Arc::new(InMemoryStore::with_records(vec![semester(
            "Imported",
            date(2, 1),
            true,
        )]));
        let flags = Arc::new(InMemoryFlagStore::new());
        let guard = DefaultSemester::new(store.clone(), flags.clone());

        assert!(!guard.ensure_default(date(9, 1)).await.unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(flags.load().unwrap().get(DEFAULT_SEMESTER_FLAG), Some(&true));
    }

    #[tokio::test]
    async fn test_unreadable_flags_are_not_overwritten() {
        let store: Arc<InMemoryStore<Semester>> = Arc::new(InMemoryStore::new());
        let flags = Arc::new(UnreadableFlagStore::default());
        let guard = DefaultSemester::new(store.clone(), flags.clone());

        assert!(guard.ensure_default(date(9, 1)).await.unwrap());
        assert!(!guard.ensure_default(date(9, 2)).await.unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(flags.saves.load(Ordering::SeqCst), 0);
    }
}
