//! Background execution of facade operations.
//!
//! `spawn` moves one operation onto the tokio runtime and hands back a
//! `BackupHandle`. Cancelling the handle aborts the task. The operation's
//! future is dropped at its current suspension point, which releases any
//! scratch directory and removes any partially written destination.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::error::BackupError;
use crate::facade::BackupFacade;
use crate::model::{BackupSelection, ExportSummary, ImportPreview, RecordType, RestoreSummary};

/// One facade operation with its arguments.
#[derive(Debug, Clone)]
pub enum BackupTask {
    ExportSingle {
        record_type: RecordType,
        destination: PathBuf,
    },
    ExportSelected {
        selection: BackupSelection,
        destination: PathBuf,
    },
    ImportSingle {
        source: PathBuf,
        declared_type: Option<RecordType>,
    },
    ImportArchive {
        source: PathBuf,
    },
    Preview {
        source: PathBuf,
    },
}

/// Result of a finished `BackupTask`.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Exported(ExportSummary),
    Restored(RestoreSummary),
    Previewed(ImportPreview),
}

/// Run `task` on the current task.
pub async fn run(facade: &BackupFacade, task: BackupTask) -> Result<TaskOutcome, BackupError> {
    match task {
        BackupTask::ExportSingle {
            record_type,
            destination,
        } => facade
            .export_single(record_type, &destination)
            .await
            .map(TaskOutcome::Exported),
        BackupTask::ExportSelected {
            selection,
            destination,
        } => facade
            .export_selected(&selection, &destination)
            .await
            .map(TaskOutcome::Exported),
        BackupTask::ImportSingle {
            source,
            declared_type,
        } => facade
            .import_single(&source, declared_type)
            .await
            .map(TaskOutcome::Restored),
        BackupTask::ImportArchive { source } => facade
            .import_archive(&source)
            .await
            .map(TaskOutcome::Restored),
        BackupTask::Preview { source } => facade.preview(&source).await.map(TaskOutcome::Previewed),
    }
}

/// Run `task` in the background.
pub fn spawn(facade: Arc<BackupFacade>, task: BackupTask) -> BackupHandle {
    debug!(?task, "spawning backup task");
    let handle = tokio::spawn(async move { run(&facade, task).await });
    BackupHandle { handle }
}

/// A running backup task.
pub struct BackupHandle {
    handle: JoinHandle<Result<TaskOutcome, BackupError>>,
}

impl BackupHandle {
    /// Request cancellation. `wait` then reports `BackupError::Cancelled`
    /// unless the task had already finished.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// A handle that can cancel the task from elsewhere, such as a signal
    /// listener, while this handle is being awaited.
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task and return its result.
    pub async fn wait(self) -> Result<TaskOutcome, BackupError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(BackupError::Cancelled),
            Err(e) => {
                warn!(error = %e, "backup task panicked");
                Err(BackupError::TaskFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::records::Task;
    use crate::stores::{EntityStore, InMemoryFlagStore, StoreSet};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Signals on first read, then never returns.
    struct StalledStore {
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl EntityStore<Task> for StalledStore {
        async fn snapshot(&self) -> Result<Vec<Task>, StoreError> {
            self.entered.notify_one();
            std::future::pending().await
        }

        async fn insert(&self, _record: Task) -> Result<i64, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_spawned_preview_completes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("prefs.json");
        std::fs::write(&source, r#"[{"key":"lang","value":"en"}]"#).unwrap();

        let facade = Arc::new(BackupFacade::new(
            StoreSet::in_memory(),
            Arc::new(InMemoryFlagStore::new()),
        ));
        let outcome = spawn(facade, BackupTask::Preview { source })
            .wait()
            .await
            .expect("Task failed");
        match outcome {
            TaskOutcome::Previewed(preview) => assert_eq!(preview.new_items, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_reports_cancelled() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let entered = Arc::new(Notify::new());
        let mut stores = StoreSet::in_memory();
        stores.tasks = Arc::new(StalledStore {
            entered: entered.clone(),
        });
        let facade = Arc::new(BackupFacade::new(stores, Arc::new(InMemoryFlagStore::new())));
        let destination = temp_dir.path().join("tasks.json");

        let handle = spawn(
            facade,
            BackupTask::ExportSingle {
                record_type: RecordType::Tasks,
                destination: destination.clone(),
            },
        );
        entered.notified().await;
        handle.cancel();

        assert!(matches!(handle.wait().await, Err(BackupError::Cancelled)));
        assert!(!destination.exists());
    }
}
