//! End-to-end export/import scenarios against in-memory and JSON-file stores.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use saison_engine::*;

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap()
}

fn task(title: &str, day: u32) -> Task {
    Task {
        id: None,
        title: title.to_string(),
        description: Some(format!("{} notes", title)),
        due_date: Some(at(day, 17)),
        is_completed: false,
        priority: Priority::High,
        category_id: Some(2),
        created_at: Some(at(1, 8)),
    }
}

fn course(name: &str, day_of_week: u8) -> Course {
    Course {
        id: None,
        name: name.to_string(),
        semester_id: 1,
        teacher: Some("Dr. Moreau".to_string()),
        location: None,
        day_of_week,
        start_period: 1,
        end_period: 2,
        weeks: (1..=16).collect(),
        color: Some("#4a90d9".to_string()),
    }
}

fn subscription(name: &str) -> Subscription {
    Subscription {
        id: None,
        name: name.to_string(),
        price: 9.99,
        currency: Some("EUR".to_string()),
        billing_cycle: BillingCycle::Monthly,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        reminder_days_before: Some(3),
    }
}

fn timer_session(hour: u32) -> TimerSession {
    TimerSession {
        id: None,
        start_time: at(4, hour),
        duration_minutes: 25,
        session_type: SessionType::Focus,
        task_id: None,
        completed: true,
    }
}

fn facade_with_scratch(root: &Path) -> BackupFacade {
    BackupFacade::new(StoreSet::in_memory(), Arc::new(InMemoryFlagStore::new())).with_config(
        EngineConfig {
            scratch_root: Some(root.join("scratch")),
            ..EngineConfig::default()
        },
    )
}

fn scratch_is_empty(root: &Path) -> bool {
    let scratch = root.join("scratch");
    !scratch.exists() || std::fs::read_dir(scratch).unwrap().count() == 0
}

async fn seed_tasks_and_courses(facade: &BackupFacade) {
    for t in [task("essay", 5), task("lab report", 6), task("slides", 7)] {
        facade.stores().tasks.insert(t).await.unwrap();
    }
    for c in [course("Algebra", 1), course("Physics", 3)] {
        facade.stores().courses.insert(c).await.unwrap();
    }
}

#[tokio::test]
async fn test_export_then_restore_into_empty_and_populated_stores() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = facade_with_scratch(temp_dir.path());
    seed_tasks_and_courses(&source).await;

    let selection = BackupSelection::only(&[RecordType::Tasks, RecordType::Courses]);
    let exported = source
        .export_selected(&selection, &temp_dir.path().join("saison_backup_20240309_141502.zip"))
        .await
        .expect("Failed to export");
    assert_eq!(exported.total_items, 5);
    assert_eq!(exported.exported_types, vec![RecordType::Tasks, RecordType::Courses]);
    assert!(exported.destination.exists());

    let target = facade_with_scratch(temp_dir.path());
    let first = target
        .import_archive(&exported.destination)
        .await
        .expect("Failed to import");
    assert_eq!(first.imported(RecordType::Tasks), 3);
    assert_eq!(first.imported(RecordType::Courses), 2);
    assert_eq!(first.skipped_duplicates, 0);

    let second = target
        .import_archive(&exported.destination)
        .await
        .expect("Failed to re-import");
    assert_eq!(second.imported(RecordType::Tasks), 0);
    assert_eq!(second.imported(RecordType::Courses), 0);
    assert_eq!(second.skipped_duplicates, 5);

    assert_eq!(target.stores().tasks.snapshot().await.unwrap().len(), 3);
    assert!(scratch_is_empty(temp_dir.path()));
}

#[tokio::test]
async fn test_preview_single_tasks_file() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let facade = facade_with_scratch(temp_dir.path());
    facade.stores().tasks.insert(task("essay", 5)).await.unwrap();

    let source = temp_dir.path().join("saison_tasks_20240309_141502.json");
    let incoming = [
        task("essay", 5),
        task("lab report", 6),
        task("slides", 7),
        task("reading", 8),
    ];
    std::fs::write(&source, codec::encode(&incoming, true).unwrap()).unwrap();

    let preview = facade.preview(&source).await.expect("Failed to preview");
    assert_eq!(preview.total_items(), 4);
    assert_eq!(preview.new_items, 3);
    assert_eq!(preview.duplicate_items, 1);
    assert!(!preview.is_zip_file);
    assert_eq!(facade.stores().tasks.snapshot().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_archive_with_three_of_eight_entries() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = facade_with_scratch(temp_dir.path());
    seed_tasks_and_courses(&source).await;
    source
        .stores()
        .subscriptions
        .insert(subscription("Music"))
        .await
        .unwrap();
    source
        .stores()
        .timer_sessions
        .insert(timer_session(9))
        .await
        .unwrap();

    let selection = BackupSelection::only(&[
        RecordType::Courses,
        RecordType::Subscriptions,
        RecordType::TimerSessions,
    ]);
    let exported = source
        .export_selected(&selection, temp_dir.path())
        .await
        .expect("Failed to export");

    let target = facade_with_scratch(temp_dir.path());
    let summary = target
        .import_archive(&exported.destination)
        .await
        .expect("Failed to import");

    for ty in RecordType::ALL {
        let expected = match ty {
            RecordType::Courses => 2,
            RecordType::Subscriptions | RecordType::TimerSessions => 1,
            _ => 0,
        };
        assert_eq!(summary.imported(ty), expected, "{}", ty);
    }
    assert!(summary.degraded_types.is_empty());
}

#[tokio::test]
async fn test_empty_selection_writes_nothing() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let facade = facade_with_scratch(temp_dir.path());
    let destination = temp_dir.path().join("nothing.zip");

    let err = facade
        .export_selected(&BackupSelection::none(), &destination)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!destination.exists());
    assert!(!temp_dir.path().join("scratch").exists());
}

#[tokio::test]
async fn test_json_file_stores_survive_restart() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = temp_dir.path().join("data");
    let backup = temp_dir.path().join("saison_backup_20240309_141502.zip");

    let source = BackupFacade::new(
        StoreSet::in_memory(),
        Arc::new(InMemoryFlagStore::new()),
    );
    seed_tasks_and_courses(&source).await;
    source
        .export_selected(&BackupSelection::all(), &backup)
        .await
        .expect("Failed to export");

    let flags = Arc::new(JsonFlagStore::new(data_dir.join("flags.json")));
    let first = BackupFacade::new(StoreSet::json_dir(&data_dir), flags.clone());
    assert_eq!(first.import_archive(&backup).await.unwrap().total_imported(), 5);

    let reopened = BackupFacade::new(StoreSet::json_dir(&data_dir), flags);
    let again = reopened.import_archive(&backup).await.unwrap();
    assert_eq!(again.total_imported(), 0);
    assert_eq!(again.skipped_duplicates, 5);
}

#[tokio::test]
async fn test_exported_archive_passes_compatibility_check() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let facade = facade_with_scratch(temp_dir.path());
    seed_tasks_and_courses(&facade).await;

    let exported = facade
        .export_selected(&BackupSelection::all(), temp_dir.path())
        .await
        .expect("Failed to export");
    let single = facade
        .export_single(RecordType::Tasks, temp_dir.path())
        .await
        .expect("Failed to export");

    let report = cross_check(&exported.destination, &single.destination, facade.config())
        .await
        .expect("Failed to check");
    assert!(report.compatible, "{:?}", report.problems);
}

#[tokio::test]
async fn test_export_checksum_matches_file() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let facade = facade_with_scratch(temp_dir.path()).with_config(EngineConfig {
        checksum: ChecksumAlgorithm::Blake3,
        ..EngineConfig::default()
    });
    seed_tasks_and_courses(&facade).await;

    let exported = facade
        .export_single(RecordType::Courses, &temp_dir.path().join("courses.json"))
        .await
        .expect("Failed to export");
    let recomputed = compute_file_checksum(&exported.destination, ChecksumAlgorithm::Blake3)
        .await
        .unwrap();
    assert_eq!(exported.checksum, recomputed);
}

/// Snapshot signals the test, then waits forever.
struct StalledTasks {
    entered: Arc<Notify>,
}

#[async_trait]
impl EntityStore<Task> for StalledTasks {
    async fn snapshot(&self) -> Result<Vec<Task>, StoreError> {
        self.entered.notify_one();
        std::future::pending().await
    }

    async fn insert(&self, _record: Task) -> Result<i64, StoreError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_cancelled_archive_import_leaves_no_scratch() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let populated = facade_with_scratch(temp_dir.path());
    seed_tasks_and_courses(&populated).await;
    let exported = populated
        .export_selected(&BackupSelection::all(), temp_dir.path())
        .await
        .unwrap();

    let entered = Arc::new(Notify::new());
    let mut stores = StoreSet::in_memory();
    stores.tasks = Arc::new(StalledTasks {
        entered: entered.clone(),
    });
    let facade = Arc::new(
        BackupFacade::new(stores, Arc::new(InMemoryFlagStore::new())).with_config(EngineConfig {
            scratch_root: Some(temp_dir.path().join("scratch")),
            ..EngineConfig::default()
        }),
    );

    let handle = spawn(
        facade.clone(),
        BackupTask::ImportArchive {
            source: exported.destination.clone(),
        },
    );
    entered.notified().await;
    handle.cancel();

    assert!(matches!(handle.wait().await, Err(BackupError::Cancelled)));
    assert!(scratch_is_empty(temp_dir.path()));
    assert!(facade.stores().courses.snapshot().await.unwrap().is_empty());
}

struct CountingListener {
    calls: AtomicUsize,
}

impl ChangeListener for CountingListener {
    fn records_inserted(
        &self,
        _record_type: RecordType,
        _count: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("reminder scheduler offline".into())
    }
}

#[tokio::test]
async fn test_failing_listener_is_called_per_batch_and_ignored() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = facade_with_scratch(temp_dir.path());
    seed_tasks_and_courses(&source).await;
    let exported = source
        .export_selected(&BackupSelection::all(), temp_dir.path())
        .await
        .unwrap();

    let listener = Arc::new(CountingListener {
        calls: AtomicUsize::new(0),
    });
    let target = facade_with_scratch(temp_dir.path()).with_listener(listener.clone());
    let summary = target.import_archive(&exported.destination).await.unwrap();

    assert_eq!(summary.total_imported(), 5);
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_semester_import_flow() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let facade = facade_with_scratch(temp_dir.path());
    let today = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();

    assert!(facade.default_semester().ensure_default(today).await.unwrap());
    assert!(!facade.default_semester().ensure_default(today).await.unwrap());

    let mut incoming = Semester::default_starting(today);
    incoming.display_settings.show_weekends = true;
    let source = temp_dir.path().join("saison_semesters_20240902_080000.json");
    std::fs::write(&source, codec::encode(&[incoming], true).unwrap()).unwrap();

    let plan = facade
        .inspect_semester_import(&source)
        .await
        .expect("Failed to inspect");
    assert!(plan.conflicts.name_conflict);
    assert!(!plan.conflicts.period_conflict);
    assert!(plan.conflicts.display_conflict);

    let summary = facade.import_single(&source, None).await.unwrap();
    assert_eq!(summary.imported(RecordType::Semesters), 0);
    assert_eq!(summary.skipped_duplicates, 1);
}

/// Signals once a record type has been encoded, just before the write starts.
struct WriteStarting {
    encoded: Arc<Notify>,
}

impl BackupProgress for WriteStarting {
    fn on_started(&self, _operation: Operation) {}

    fn on_type_processed(&self, _operation: Operation, _record_type: RecordType, _count: usize) {
        self.encoded.notify_one();
    }

    fn on_completed(&self, _operation: Operation) {}
}

fn dir_entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_during_write_leaves_no_destination() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let preferences: Vec<Preference> = (0..20_000)
        .map(|i| Preference {
            key: format!("key_{}", i),
            value: serde_json::json!({ "index": i, "label": "x".repeat(32) }),
        })
        .collect();

    let encoded = Arc::new(Notify::new());
    let mut stores = StoreSet::in_memory();
    stores.preferences = Arc::new(InMemoryStore::with_records(preferences));
    let facade = Arc::new(
        BackupFacade::new(stores, Arc::new(InMemoryFlagStore::new())).with_progress(Arc::new(
            WriteStarting {
                encoded: encoded.clone(),
            },
        )),
    );

    for round in 0..40 {
        let out_dir = temp_dir.path().join(format!("round_{}", round));
        std::fs::create_dir_all(&out_dir).unwrap();
        let destination = out_dir.join("preferences.json");

        let handle = spawn(
            facade.clone(),
            BackupTask::ExportSingle {
                record_type: RecordType::Preferences,
                destination: destination.clone(),
            },
        );
        encoded.notified().await;
        handle.cancel();
        let result = handle.wait().await;

        // Let any blocking-pool write that outlived the task finish.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        match result {
            Err(BackupError::Cancelled) => {
                assert!(dir_entries(&out_dir).is_empty(), "round {}", round);
            }
            Ok(_) => {
                assert_eq!(dir_entries(&out_dir), vec!["preferences.json".to_string()]);
            }
            Err(e) => panic!("round {}: unexpected error {}", round, e),
        }
    }
}
