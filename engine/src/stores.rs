//! Collaborator interfaces the engine reads from and writes to.
//!
//! Entity persistence belongs to the host application. The engine only needs
//! `snapshot` and `insert` (or a batched `insert_all`) per record type, a small persisted key/bool map,
//! and an optional listener told about inserts. In-memory and JSON-file
//! implementations are provided for tests and the command-line front end.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::StoreError;
use crate::model::RecordType;
use crate::records::*;

/// Persistence for one record type.
#[async_trait]
pub trait EntityStore<T: BackupRecord>: Send + Sync {
    /// Every record currently stored.
    async fn snapshot(&self) -> Result<Vec<T>, StoreError>;

    /// Store a new record and return its assigned identity.
    async fn insert(&self, record: T) -> Result<i64, StoreError>;

    /// Store `records` in order and return their identities.
    ///
    /// Stores with a per-write cost should override this to write once.
    async fn insert_all(&self, records: Vec<T>) -> Result<Vec<i64>, StoreError> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(self.insert(record).await?);
        }
        Ok(ids)
    }
}

/// A persisted string-keyed boolean map.
pub trait FlagStore: Send + Sync {
    fn load(&self) -> Result<HashMap<String, bool>, StoreError>;

    fn save(&self, flags: &HashMap<String, bool>) -> Result<(), StoreError>;
}

/// Receives best-effort notice of inserted records (widget refresh,
/// reminder rescheduling and the like).
pub trait ChangeListener: Send + Sync {
    fn records_inserted(
        &self,
        record_type: RecordType,
        count: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// One store per record type.
#[derive(Clone)]
pub struct StoreSet {
    pub tasks: Arc<dyn EntityStore<Task>>,
    pub courses: Arc<dyn EntityStore<Course>>,
    pub events: Arc<dyn EntityStore<Event>>,
    pub routines: Arc<dyn EntityStore<Routine>>,
    pub subscriptions: Arc<dyn EntityStore<Subscription>>,
    pub timer_sessions: Arc<dyn EntityStore<TimerSession>>,
    pub semesters: Arc<dyn EntityStore<Semester>>,
    pub preferences: Arc<dyn EntityStore<Preference>>,
}

impl StoreSet {
    /// Empty in-memory stores.
    pub fn in_memory() -> Self {
        StoreSet {
            tasks: Arc::new(InMemoryStore::new()),
            courses: Arc::new(InMemoryStore::new()),
            events: Arc::new(InMemoryStore::new()),
            routines: Arc::new(InMemoryStore::new()),
            subscriptions: Arc::new(InMemoryStore::new()),
            timer_sessions: Arc::new(InMemoryStore::new()),
            semesters: Arc::new(InMemoryStore::new()),
            preferences: Arc::new(InMemoryStore::new()),
        }
    }

    /// JSON-file stores, one `<entry name>` file per type inside `dir`.
    pub fn json_dir(dir: &Path) -> Self {
        StoreSet {
            tasks: Arc::new(JsonFileStore::in_dir(dir)),
            courses: Arc::new(JsonFileStore::in_dir(dir)),
            events: Arc::new(JsonFileStore::in_dir(dir)),
            routines: Arc::new(JsonFileStore::in_dir(dir)),
            subscriptions: Arc::new(JsonFileStore::in_dir(dir)),
            timer_sessions: Arc::new(JsonFileStore::in_dir(dir)),
            semesters: Arc::new(JsonFileStore::in_dir(dir)),
            preferences: Arc::new(JsonFileStore::in_dir(dir)),
        }
    }

    /// The store that owns records of type `T`.
    pub fn get<T: StoredRecord>(&self) -> &dyn EntityStore<T> {
        T::store_in(self)
    }
}

/// Links a record type to its slot in a `StoreSet`.
pub trait StoredRecord: BackupRecord + Sized {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self>;
}

impl StoredRecord for Task {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self> {
        stores.tasks.as_ref()
    }
}

impl StoredRecord for Course {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self> {
        stores.courses.as_ref()
    }
}

impl StoredRecord for Event {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self> {
        stores.events.as_ref()
    }
}

impl StoredRecord for Routine {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self> {
        stores.routines.as_ref()
    }
}

impl StoredRecord for Subscription {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self> {
        stores.subscriptions.as_ref()
    }
}

impl StoredRecord for TimerSession {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self> {
        stores.timer_sessions.as_ref()
    }
}

impl StoredRecord for Semester {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self> {
        stores.semesters.as_ref()
    }
}

impl StoredRecord for Preference {
    fn store_in(stores: &StoreSet) -> &dyn EntityStore<Self> {
        stores.preferences.as_ref()
    }
}

/// Volatile store assigning sequential identities.
pub struct InMemoryStore<T> {
    state: Mutex<(Vec<T>, i64)>,
}

impl<T: BackupRecord> InMemoryStore<T> {
    pub fn new() -> Self {
        InMemoryStore {
            state: Mutex::new((Vec::new(), 0)),
        }
    }

    /// Seed the store with records that already carry identities.
    pub fn with_records(records: Vec<T>) -> Self {
        let next = records.iter().filter_map(|r| r.identity()).max().unwrap_or(0);
        InMemoryStore {
            state: Mutex::new((records, next)),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: BackupRecord> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: BackupRecord> EntityStore<T> for InMemoryStore<T> {
    async fn snapshot(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.state.lock().0.clone())
    }

    async fn insert(&self, mut record: T) -> Result<i64, StoreError> {
        let mut state = self.state.lock();
        state.1 += 1;
        let id = state.1;
        record.assign_identity(id);
        state.0.push(record);
        Ok(id)
    }

    async fn insert_all(&self, records: Vec<T>) -> Result<Vec<i64>, StoreError> {
        let mut state = self.state.lock();
        let mut ids = Vec::with_capacity(records.len());
        for mut record in records {
            state.1 += 1;
            record.assign_identity(state.1);
            ids.push(state.1);
            state.0.push(record);
        }
        Ok(ids)
    }
}

/// Store persisting a JSON array to a single file.
pub struct JsonFileStore<T> {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    _records: PhantomData<fn() -> T>,
}

impl<T: BackupRecord> JsonFileStore<T> {
    pub fn new(path: PathBuf) -> Self {
        JsonFileStore {
            path,
            write_lock: tokio::sync::Mutex::new(()),
            _records: PhantomData,
        }
    }

    /// Store at `<dir>/<entry name of T>`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(T::RECORD_TYPE.entry_name()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<T>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, records: &[T]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }
}

fn next_identity<T: BackupRecord>(records: &[T]) -> i64 {
    records.iter().filter_map(|r| r.identity()).max().unwrap_or(0) + 1
}

#[async_trait]
impl<T: BackupRecord> EntityStore<T> for JsonFileStore<T> {
    async fn snapshot(&self) -> Result<Vec<T>, StoreError> {
        self.read_all().await
    }

    async fn insert(&self, mut record: T) -> Result<i64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        let id = next_identity(&records);
        record.assign_identity(id);
        records.push(record);
        self.write_all(&records).await?;
        Ok(id)
    }

    async fn insert_all(&self, incoming: Vec<T>) -> Result<Vec<i64>, StoreError> {
        if incoming.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        let first = next_identity(&records);
        let mut ids = Vec::with_capacity(incoming.len());
        for (offset, mut record) in (0..).zip(incoming) {
            let id = first + offset;
            record.assign_identity(id);
            ids.push(id);
            records.push(record);
        }
        self.write_all(&records).await?;
        Ok(ids)
    }
}

/// Flag map held in memory.
#[derive(Default)]
pub struct InMemoryFlagStore {
    flags: Mutex<HashMap<String, bool>>,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for InMemoryFlagStore {
    fn load(&self) -> Result<HashMap<String, bool>, StoreError> {
        Ok(self.flags.lock().clone())
    }

    fn save(&self, flags: &HashMap<String, bool>) -> Result<(), StoreError> {
        *self.flags.lock() = flags.clone();
        Ok(())
    }
}

/// Flag map persisted as a JSON object.
pub struct JsonFlagStore {
    path: PathBuf,
}

impl JsonFlagStore {
    pub fn new(path: PathBuf) -> Self {
        JsonFlagStore { path }
    }
}

impl FlagStore for JsonFlagStore {
    fn load(&self) -> Result<HashMap<String, bool>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, flags: &HashMap<String, bool>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(flags)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preference(key: &str) -> Preference {
        Preference {
            key: key.to_string(),
            value: serde_json::json!(true),
        }
    }

    fn routine(title: &str) -> Routine {
        Routine {
            id: None,
            title: title.to_string(),
            cycle: RoutineCycle {
                kind: CycleKind::Daily,
                interval: 1,
                days_of_week: vec![],
            },
            reminder_time: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_in_memory_assigns_sequential_ids() {
        let store = InMemoryStore::with_records(vec![Routine {
            id: Some(5),
            ..routine("seeded")
        }]);
        let id = store.insert(routine("new")).await.unwrap();
        assert_eq!(id, 6);
        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].id, Some(6));
    }

    #[tokio::test]
    async fn test_json_file_store_persists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store: JsonFileStore<Routine> = JsonFileStore::in_dir(temp_dir.path());
        assert!(store.snapshot().await.unwrap().is_empty());

        assert_eq!(store.insert(routine("a")).await.unwrap(), 1);
        assert_eq!(store.insert(routine("b")).await.unwrap(), 2);
        assert!(store.path().ends_with("routines.json"));

        let reopened: JsonFileStore<Routine> = JsonFileStore::in_dir(temp_dir.path());
        let titles: Vec<_> = reopened
            .snapshot()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_json_file_store_batch_insert() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store: JsonFileStore<Routine> = JsonFileStore::in_dir(temp_dir.path());
        store.insert(routine("first")).await.unwrap();

        let batch: Vec<_> = (0..500).map(|i| routine(&format!("r{}", i))).collect();
        let ids = store.insert_all(batch).await.expect("Failed to insert batch");
        assert_eq!(ids, (2..=501).collect::<Vec<i64>>());
        assert!(store.insert_all(Vec::new()).await.unwrap().is_empty());

        let reopened: JsonFileStore<Routine> = JsonFileStore::in_dir(temp_dir.path());
        let records = reopened.snapshot().await.unwrap();
        assert_eq!(records.len(), 501);
        assert_eq!(records[0].title, "first");
        assert_eq!(records[500].id, Some(501));
        assert_eq!(records[500].title, "r499");
    }

    #[tokio::test]
    async fn test_in_memory_batch_insert_continues_ids() {
        let store = InMemoryStore::with_records(vec![Routine {
            id: Some(3),
            ..routine("seeded")
        }]);
        let ids = store
            .insert_all(vec![routine("a"), routine("b")])
            .await
            .unwrap();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_json_file_store_reports_corruption() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::write(temp_dir.path().join("preferences.json"), "{broken").unwrap();
        let store: JsonFileStore<Preference> = JsonFileStore::in_dir(temp_dir.path());
        assert!(matches!(store.snapshot().await, Err(StoreError::Corrupt(_))));
        assert!(store.insert(preference("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_store_set_lookup() {
        let stores = StoreSet::in_memory();
        stores.get::<Preference>().insert(preference("lang")).await.unwrap();
        assert_eq!(stores.preferences.snapshot().await.unwrap().len(), 1);
        assert!(stores.get::<Task>().snapshot().await.unwrap().is_empty());
    }

    #[test]
    fn test_json_flag_store_round_trip() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = JsonFlagStore::new(temp_dir.path().join("state").join("flags.json"));
        assert!(store.load().unwrap().is_empty());

        let mut flags = HashMap::new();
        flags.insert("backup_select_tasks".to_string(), false);
        store.save(&flags).unwrap();
        assert_eq!(store.load().unwrap(), flags);
    }
}
