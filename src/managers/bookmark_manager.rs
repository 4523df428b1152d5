//! Bookmark commands: create, update and confirmed delete.
//!
//! Each command talks to the [`BookmarkTable`] scoped to the signed-in owner
//! and reconciles the local list from the response, without waiting for the
//! push echo (which the keyed list then absorbs).

use serde::Serialize;

use crate::backend::BookmarkTable;
use crate::managers::bookmark_list::BookmarkList;
use crate::managers::edit_form::BookmarkForm;
use crate::types::bookmark::{Bookmark, BookmarkPatch, NewBookmark};
use crate::types::errors::{BookmarkError, CommandError, FormError};
use crate::types::session::AuthUser;

/// Question asked before a delete is sent.
pub const DELETE_PROMPT: &str = "Delete this bookmark?";

/// Asks the user to confirm a destructive action.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message for the user about something that happened out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Created(Bookmark),
    Updated(Bookmark),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined; nothing was sent.
    Cancelled,
}

/// Stateless command set over a backend table.
pub struct BookmarkManager<'a, T: BookmarkTable> {
    table: &'a T,
}

impl<'a, T: BookmarkTable> BookmarkManager<'a, T> {
    pub fn new(table: &'a T) -> Self {
        Self { table }
    }

    /// Creates or updates depending on the form's edit mode.
    ///
    /// Invalid input fails before any request. While editing, the form is
    /// back to idle afterwards whatever the outcome.
    pub async fn submit(
        &self,
        user: Option<&AuthUser>,
        form: &mut BookmarkForm,
        list: &mut BookmarkList,
    ) -> Result<SubmitOutcome, CommandError> {
        let user = user.ok_or(CommandError::NotSignedIn)?;
        if form.is_submitting() {
            return Err(FormError::Busy.into());
        }
        let draft = form.validate()?;

        form.begin_submit()?;
        let result = match form.editing_id().map(str::to_string) {
            Some(id) => {
                let patch = BookmarkPatch {
                    title: draft.title,
                    url: draft.url,
                };
                self.update(&id, &user.id, &patch, list).await.map(SubmitOutcome::Updated)
            }
            None => {
                let row = NewBookmark {
                    title: draft.title,
                    url: draft.url,
                    user_id: user.id.clone(),
                };
                self.create(&row, list).await.map(SubmitOutcome::Created)
            }
        };
        form.finish_submit(result.is_ok());
        result.map_err(CommandError::from)
    }

    /// Inserts `row` and upserts the returned record.
    pub async fn create(&self, row: &NewBookmark, list: &mut BookmarkList) -> Result<Bookmark, BookmarkError> {
        match self.table.insert(row).await {
            Ok(created) => {
                tracing::info!(id = %created.id, "bookmark created");
                list.upsert(created.clone());
                Ok(created)
            }
            Err(e) => {
                tracing::error!(error = %e, "bookmark create failed");
                Err(e)
            }
        }
    }

    /// Updates the (id, owner) row and replaces the local record.
    pub async fn update(
        &self,
        id: &str,
        owner: &str,
        patch: &BookmarkPatch,
        list: &mut BookmarkList,
    ) -> Result<Bookmark, BookmarkError> {
        match self.table.update(id, owner, patch).await {
            Ok(updated) => {
                tracing::info!(id, "bookmark updated");
                list.upsert(updated.clone());
                Ok(updated)
            }
            Err(e) => {
                tracing::error!(id, error = %e, "bookmark update failed");
                Err(e)
            }
        }
    }

    /// Deletes the (id, owner) row after `confirm` agrees.
    ///
    /// A row the backend no longer has is removed locally and counts as deleted.
    pub async fn delete<C: Confirm + ?Sized>(
        &self,
        user: Option<&AuthUser>,
        id: &str,
        list: &mut BookmarkList,
        form: &mut BookmarkForm,
        confirm: &mut C,
    ) -> Result<DeleteOutcome, CommandError> {
        let user = user.ok_or(CommandError::NotSignedIn)?;
        if list.get(id).is_none() {
            return Err(FormError::UnknownBookmark(id.to_string()).into());
        }
        if !confirm.confirm(DELETE_PROMPT) {
            tracing::debug!(id, "delete cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }

        match self.table.delete(id, &user.id).await {
            Ok(()) => tracing::info!(id, "bookmark deleted"),
            Err(BookmarkError::NotFound(_)) => {
                tracing::warn!(id, "bookmark already gone on the backend");
            }
            Err(e) => {
                tracing::error!(id, error = %e, "bookmark delete failed");
                return Err(e.into());
            }
        }
        list.remove(id);
        form.forget_target(id);
        Ok(DeleteOutcome::Deleted)
    }
}
