//! The record store: one worker thread owns the SQLite connection, callers
//! talk to it through a command channel and watch the full record set.
//!
//! Mutations are fire-and-forget. Each returns a [`Pending`] ticket that can be
//! awaited for the outcome or simply dropped; the new state itself arrives on
//! the snapshot channel.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot, watch};

use crate::clock::Clock;
use crate::database::{Database, StoreError};
use crate::migrations::{MigrationReport, Migrator};
use crate::models::{validate_text, TaskId, TaskPatch, TaskRecord};

/// The complete set of records at one point in time, newest first.
pub type Snapshot = Arc<Vec<TaskRecord>>;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

enum Command {
    Create {
        text: String,
        due_date: Option<DateTime<Utc>>,
        reply: Reply<TaskId>,
    },
    Update {
        id: TaskId,
        patch: TaskPatch,
        reply: Reply<()>,
    },
    Toggle {
        id: TaskId,
        reply: Reply<()>,
    },
    Delete {
        id: TaskId,
        reply: Reply<()>,
    },
    Get {
        id: TaskId,
        reply: Reply<TaskRecord>,
    },
}

/// Outcome of a queued store command.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T, StoreError>>,
}

impl<T> Pending<T> {
    pub async fn wait(self) -> Result<T, StoreError> {
        self.rx.await.unwrap_or(Err(StoreError::Closed))
    }

    /// Block the current thread for the outcome. Must not be called from
    /// inside an async context.
    pub fn wait_blocking(self) -> Result<T, StoreError> {
        self.rx.blocking_recv().unwrap_or(Err(StoreError::Closed))
    }
}

/// Handle to an open task store.
pub struct RecordStore {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    worker: JoinHandle<()>,
}

impl RecordStore {
    /// Open the database at `path`, migrate it, and start the worker.
    ///
    /// Returns only once the schema is current; nothing can be read or
    /// written before that.
    pub fn open<C: Clock>(path: &Path, clock: Arc<C>) -> Result<(Self, MigrationReport), StoreError> {
        Self::open_with(path, &Migrator::default(), clock)
    }

    pub fn open_with<C: Clock>(
        path: &Path,
        migrator: &Migrator<'_>,
        clock: Arc<C>,
    ) -> Result<(Self, MigrationReport), StoreError> {
        let (db, report) = Database::open(path, migrator, clock.now_utc())?;
        log_report(&report);
        Ok((Self::start(db, clock)?, report))
    }

    /// Start a store over a database that has already been migrated.
    pub fn start<C: Clock>(db: Database, clock: Arc<C>) -> Result<Self, StoreError> {
        let initial = db.get_all_tasks()?;
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(initial));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let worker = std::thread::Builder::new()
            .name("tasklane-store".to_string())
            .spawn(move || run_worker(db, clock, command_rx, snapshot_tx))
            .map_err(|e| StoreError::WorkerError(e.to_string()))?;

        Ok(Self {
            commands: command_tx,
            snapshots: snapshot_rx,
            worker,
        })
    }

    pub fn create(&self, text: &str, due_date: Option<DateTime<Utc>>) -> Result<Pending<TaskId>, StoreError> {
        let text = validate_text(text)?;
        self.send(|reply| Command::Create { text, due_date, reply })
    }

    pub fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Pending<()>, StoreError> {
        patch.validate()?;
        self.send(|reply| Command::Update { id, patch, reply })
    }

    pub fn toggle_completion(&self, id: TaskId) -> Result<Pending<()>, StoreError> {
        self.send(|reply| Command::Toggle { id, reply })
    }

    pub fn delete(&self, id: TaskId) -> Result<Pending<()>, StoreError> {
        self.send(|reply| Command::Delete { id, reply })
    }

    /// Look up one task. Queued behind every earlier mutation, so it sees
    /// their effects.
    pub async fn get_by_id(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        self.send(|reply| Command::Get { id, reply })?.wait().await
    }

    /// The most recent committed record set.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that yields every new record set. The current one is
    /// available immediately through `borrow`.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        let mut rx = self.snapshots.clone();
        rx.mark_unchanged();
        rx
    }

    /// Stop accepting commands, let the worker drain the queue and close the
    /// connection.
    pub fn close(self) -> Result<(), StoreError> {
        let RecordStore { commands, worker, .. } = self;
        drop(commands);
        worker
            .join()
            .map_err(|_| StoreError::WorkerError("store worker panicked".to_string()))
    }

    fn send<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<Pending<T>, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| StoreError::Closed)?;
        Ok(Pending { rx })
    }
}

fn log_report(report: &MigrationReport) {
    if report.created {
        tracing::info!(version = report.to_version, "created task database");
    } else if report.applied.is_empty() {
        tracing::debug!(version = report.to_version, "task database schema is current");
    } else {
        tracing::info!(
            from = report.from_version,
            to = report.to_version,
            steps = report.applied.len(),
            "migrated task database"
        );
    }
}

fn run_worker<C: Clock>(
    db: Database,
    clock: Arc<C>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Snapshot>,
) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Create { text, due_date, reply } => {
                let result = TaskRecord::new(&text, due_date, clock.now_utc()).and_then(|task| db.insert_task(&task));
                finish(&db, &snapshots, "create", reply, result);
            }
            Command::Update { id, patch, reply } => {
                let result = db.patch_task(id, &patch, clock.now_utc()).map(|_| ());
                finish(&db, &snapshots, "update", reply, result);
            }
            Command::Toggle { id, reply } => {
                let result = db.toggle_task(id, clock.now_utc()).map(|_| ());
                finish(&db, &snapshots, "toggle", reply, result);
            }
            Command::Delete { id, reply } => {
                let result = db.delete_task(id);
                finish(&db, &snapshots, "delete", reply, result);
            }
            Command::Get { id, reply } => {
                let _ = reply.send(db.get_task(id));
            }
        }
    }

    tracing::debug!("store worker shutting down");
    if let Err(e) = db.close() {
        tracing::warn!(error = %e, "failed to close task database");
    }
}

/// Publish a fresh snapshot after a successful write, then answer the caller.
/// A failed write publishes nothing.
fn finish<T: std::fmt::Debug>(
    db: &Database,
    snapshots: &watch::Sender<Snapshot>,
    operation: &'static str,
    reply: Reply<T>,
    result: Result<T, StoreError>,
) {
    match result {
        Ok(ref value) => {
            tracing::debug!(operation, ?value, "task store updated");
            publish(db, snapshots);
        }
        Err(ref e) => tracing::warn!(operation, error = %e, "task store operation failed"),
    }
    let _ = reply.send(result);
}

/// Reload the record set and hand it to subscribers. The write behind it has
/// already committed, so a failed reload is logged and the caller still gets
/// its result.
fn publish(db: &Database, snapshots: &watch::Sender<Snapshot>) {
    match db.get_all_tasks() {
        Ok(records) => {
            snapshots.send_replace(Arc::new(records));
        }
        Err(e) => tracing::error!(error = %e, "failed to reload tasks after a write"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{FixedOffset, TimeZone, Weekday};

    fn clock() -> Arc<FixedClock> {
        let now = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();
        Arc::new(FixedClock::new(now, Weekday::Mon))
    }

    fn open_store(dir: &tempfile::TempDir) -> RecordStore {
        RecordStore::open(&dir.path().join("tasks.db"), clock()).unwrap().0
    }

    #[tokio::test]
    async fn create_is_visible_in_next_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let mut rx = store.subscribe();
        assert!(store.snapshot().is_empty());

        let id = store.create("  call mum ", None).unwrap().wait().await.unwrap();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].text, "call mum");
        assert_eq!(snapshot[0].creation_date, clock().now_utc());
        store.close().unwrap();
    }

    #[tokio::test]
    async fn mutations_apply_in_issue_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let id = store.create("draft", None).unwrap().wait().await.unwrap();

        // Not awaited: both are queued before either runs.
        let _first = store.update(id, TaskPatch::new().text("first")).unwrap();
        let second = store.update(id, TaskPatch::new().text("second")).unwrap();
        second.wait().await.unwrap();

        assert_eq!(store.get_by_id(id).await.unwrap().text, "second");
        store.close().unwrap();
    }

    #[tokio::test]
    async fn toggle_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let id = store.create("laundry", None).unwrap().wait().await.unwrap();

        store.toggle_completion(id).unwrap().wait().await.unwrap();
        assert!(store.get_by_id(id).await.unwrap().is_completed);

        store.delete(id).unwrap().wait().await.unwrap();
        assert!(matches!(store.get_by_id(id).await, Err(StoreError::NotFound(_))));
        assert!(store.snapshot().is_empty());
        store.close().unwrap();
    }

    #[tokio::test]
    async fn rejected_commands_do_not_advance_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.create("keep", None).unwrap().wait().await.unwrap();
        let rx = store.subscribe();
        let before = store.snapshot();

        assert!(matches!(store.create("   ", None), Err(StoreError::ValidationError(_))));
        assert!(matches!(store.update(1, TaskPatch::new().text("")), Err(StoreError::ValidationError(_))));
        assert!(matches!(store.delete(99).unwrap().wait().await, Err(StoreError::NotFound(99))));
        assert!(matches!(store.toggle_completion(99).unwrap().wait().await, Err(StoreError::NotFound(99))));

        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.snapshot(), before);
        store.close().unwrap();
    }

    #[tokio::test]
    async fn close_drains_queued_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let (store, _) = RecordStore::open(&path, clock()).unwrap();
        let pending = store.create("last words", None).unwrap();
        store.close().unwrap();
        pending.wait().await.unwrap();

        let (store, report) = RecordStore::open(&path, clock()).unwrap();
        assert!(report.is_noop());
        assert_eq!(store.snapshot()[0].text, "last words");
        store.close().unwrap();
    }

    #[tokio::test]
    async fn committed_write_succeeds_even_if_reload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let (store, _) = RecordStore::open(&path, clock()).unwrap();
        let broken = store.create("broken", None).unwrap().wait().await.unwrap();
        let fine = store.create("fine", None).unwrap().wait().await.unwrap();
        let before = store.snapshot();

        // Damage one row behind the store's back so the next reload is refused.
        let other = rusqlite::Connection::open(&path).unwrap();
        other
            .execute("UPDATE tasks SET update_date = creation_date - 1 WHERE id = ?1", [broken])
            .unwrap();

        store.toggle_completion(fine).unwrap().wait().await.unwrap();

        let done: bool = other
            .query_row("SELECT is_completed FROM tasks WHERE id = ?1", [fine], |row| row.get(0))
            .unwrap();
        assert!(done);
        assert_eq!(store.snapshot(), before);
        store.close().unwrap();
    }

    #[test]
    fn opening_a_v1_database_migrates_before_serving() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    text TEXT NOT NULL,
                    is_completed INTEGER NOT NULL DEFAULT 0
                );
                INSERT INTO tasks (text) VALUES ('from the old app');
                PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let (store, report) = RecordStore::open(&path, clock()).unwrap();
        assert_eq!(report.applied, vec![(1, 2), (2, 3)]);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        let task = &snapshot[0];
        assert_eq!(task.id, 1);
        assert_eq!(task.text, "from the old app");
        assert_eq!(task.creation_date, clock().now_utc());
        assert_eq!(task.update_date, task.creation_date);
        assert_eq!(task.due_date, None);
        store.close().unwrap();

        let conn = rusqlite::Connection::open(&path).unwrap();
        assert_eq!(crate::migrations::read_version(&conn).unwrap(), 3);
    }

    #[test]
    fn newer_schema_refuses_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE tasks (id INTEGER PRIMARY KEY); PRAGMA user_version = 7;")
                .unwrap();
        }

        let result = RecordStore::open(&path, clock());
        assert!(matches!(result, Err(StoreError::MigrationError(_))));
    }
}
