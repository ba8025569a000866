use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use crate::dates::{from_millis, to_millis};
use crate::migrations::{MigrationContext, MigrationError, MigrationReport, Migrator};
use crate::models::{TaskId, TaskPatch, TaskRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid task: {0}")]
    ValidationError(String),
    #[error("Task {0} not found")]
    NotFound(TaskId),
    #[error("Migration failed: {0}")]
    MigrationError(#[from] MigrationError),
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Store worker failed: {0}")]
    WorkerError(String),
    #[error("Record store is closed")]
    Closed,
}

const TASK_COLUMNS: &str = "id, text, is_completed, creation_date, update_date, due_date";

/// Synchronous access to the task table. Only ever touched by one thread.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date.
    pub fn open(path: &Path, migrator: &Migrator<'_>, now: DateTime<Utc>) -> Result<(Self, MigrationReport), StoreError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn, migrator, now)
    }

    /// Wrap an already opened connection, migrating it first.
    pub fn from_connection(
        mut conn: Connection,
        migrator: &Migrator<'_>,
        now: DateTime<Utc>,
    ) -> Result<(Self, MigrationReport), StoreError> {
        let report = migrator.run(&mut conn, &MigrationContext { executed_at: now })?;
        Ok((Database { conn }, report))
    }

    /// Close the connection, reporting any error SQLite gives on the way out.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::SqliteError(e))
    }

    /// Insert a task and return its new ID
    pub fn insert_task(&self, task: &TaskRecord) -> Result<TaskId, StoreError> {
        self.conn.execute(
            "INSERT INTO tasks (text, is_completed, creation_date, update_date, due_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                task.text,
                task.is_completed,
                to_millis(task.creation_date),
                to_millis(task.update_date),
                task.due_date.map(to_millis),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Helper function to map a row to a TaskRecord
    ///
    /// Rows breaking the record invariants are refused here so nothing past
    /// the store ever sees them.
    fn row_to_task(row: &rusqlite::Row) -> Result<TaskRecord, rusqlite::Error> {
        let task = TaskRecord {
            id: row.get(0)?,
            text: row.get(1)?,
            is_completed: row.get(2)?,
            creation_date: instant(row, 3)?,
            update_date: instant(row, 4)?,
            due_date: row
                .get::<_, Option<i64>>(5)?
                .map(|millis| from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(5, millis)))
                .transpose()?,
        };

        if task.text.trim().is_empty() {
            return Err(corrupt_row(1, Type::Text, format!("task {} has blank text", task.id)));
        }
        if task.update_date < task.creation_date {
            return Err(corrupt_row(
                4,
                Type::Integer,
                format!("task {} was updated before it was created", task.id),
            ));
        }
        Ok(task)
    }

    /// Get every task, newest first
    pub fn get_all_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id DESC"))?;
        let tasks = stmt.query_map([], Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Get a single task by ID
    pub fn get_task(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;

        match stmt.query_row(rusqlite::params![id], Self::row_to_task) {
            Ok(task) => Ok(task),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound(id)),
            Err(e) => Err(StoreError::from(e)),
        }
    }

    /// Overwrite the mutable columns of an existing task
    fn write_task(&self, task: &TaskRecord) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE tasks SET text = ?1, is_completed = ?2, update_date = ?3, due_date = ?4 WHERE id = ?5",
            rusqlite::params![
                task.text,
                task.is_completed,
                to_millis(task.update_date),
                task.due_date.map(to_millis),
                task.id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(task.id));
        }
        Ok(())
    }

    /// Read, patch and write back one task inside a single transaction.
    pub fn patch_task(&self, id: TaskId, patch: &TaskPatch, now: DateTime<Utc>) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let current = self.get_task(id)?;
        let updated = patch.apply(&current, now)?;
        self.write_task(&updated)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Flip the completion flag of a task
    pub fn toggle_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let current = self.get_task(id)?;
        let updated = TaskPatch::new().completed(!current.is_completed).apply(&current, now)?;
        self.write_task(&updated)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Delete a task by ID
    pub fn delete_task(&self, id: TaskId) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id));
        }
        tx.commit()?;
        Ok(())
    }
}

fn corrupt_row(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}

fn instant(row: &rusqlite::Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let millis: i64 = row.get(idx)?;
    from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}
