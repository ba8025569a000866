use chrono::{DateTime, Utc};

use crate::database::StoreError;
use crate::models::{TaskId, TaskPatch, TaskRecord};
use crate::store::{Pending, RecordStore};

/// The one task currently open for editing, if any.
///
/// Holds a copy of the record as it was when editing began plus the pending
/// changes, so nothing shared is mutated until the patch is committed.
#[derive(Debug, Default)]
pub struct EditSession {
    editing: Option<Draft>,
}

#[derive(Debug)]
struct Draft {
    original: TaskRecord,
    patch: TaskPatch,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin editing `record`, discarding any edit already in progress.
    pub fn start(&mut self, record: TaskRecord) {
        self.editing = Some(Draft { original: record, patch: TaskPatch::new() });
    }

    pub fn editing_id(&self) -> Option<TaskId> {
        self.editing.as_ref().map(|draft| draft.original.id)
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        if let Some(draft) = self.editing.as_mut() {
            draft.patch.text = Some(text.into());
        }
    }

    pub fn set_due_date(&mut self, due_date: Option<DateTime<Utc>>) {
        if let Some(draft) = self.editing.as_mut() {
            draft.patch.due_date = Some(due_date);
        }
    }

    pub fn set_completed(&mut self, is_completed: bool) {
        if let Some(draft) = self.editing.as_mut() {
            draft.patch.is_completed = Some(is_completed);
        }
    }

    /// The record as it would look after committing, for display.
    pub fn preview(&self, now: DateTime<Utc>) -> Option<Result<TaskRecord, StoreError>> {
        self.editing
            .as_ref()
            .map(|draft| draft.patch.apply(&draft.original, now))
    }

    /// Abandon the current edit.
    pub fn cancel(&mut self) {
        self.editing = None;
    }

    /// Send the pending changes to the store and end the session.
    ///
    /// On a validation error the session stays open so the input can be
    /// fixed. Returns `None` when nothing was being edited.
    pub fn commit(&mut self, store: &RecordStore) -> Option<Result<Pending<()>, StoreError>> {
        let draft = self.editing.take()?;
        match store.update(draft.original.id, draft.patch.clone()) {
            Ok(pending) => Some(Ok(pending)),
            Err(e) => {
                self.editing = Some(draft);
                Some(Err(e))
            }
        }
    }
}
