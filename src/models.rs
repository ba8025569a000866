use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::StoreError;

pub type TaskId = i64;

/// A persisted task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub text: String,
    pub is_completed: bool,
    pub creation_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Build a fresh, not yet persisted record. The id is filled in by the store.
    pub fn new(text: &str, due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<Self, StoreError> {
        Ok(Self {
            id: 0,
            text: validate_text(text)?,
            is_completed: false,
            creation_date: now,
            update_date: now,
            due_date,
        })
    }
}

/// Trim task text and reject it if nothing is left.
pub fn validate_text(text: &str) -> Result<String, StoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(StoreError::ValidationError("Task text must not be blank".to_string()));
    }
    Ok(trimmed.to_string())
}

/// A set of field changes applied to a record as a whole new value.
///
/// `due_date` is doubly optional: `None` leaves the deadline alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub is_completed: Option<bool>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn due_date(mut self, due_date: Option<DateTime<Utc>>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn completed(mut self, is_completed: bool) -> Self {
        self.is_completed = Some(is_completed);
        self
    }

    /// Check the patch on its own, so a bad edit is refused before it is queued.
    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(ref text) = self.text {
            validate_text(text)?;
        }
        Ok(())
    }

    /// Produce the patched copy of `record`. `update_date` moves to `now`,
    /// but never behind `creation_date`.
    pub fn apply(&self, record: &TaskRecord, now: DateTime<Utc>) -> Result<TaskRecord, StoreError> {
        let text = match self.text {
            Some(ref text) => validate_text(text)?,
            None => record.text.clone(),
        };
        Ok(TaskRecord {
            id: record.id,
            text,
            is_completed: self.is_completed.unwrap_or(record.is_completed),
            creation_date: record.creation_date,
            update_date: now.max(record.creation_date),
            due_date: self.due_date.unwrap_or(record.due_date),
        })
    }
}
