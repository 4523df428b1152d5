//! Add/edit form and its edit-mode state machine.
//!
//! `Idle` means the form creates a new bookmark; `Editing` means it updates
//! `target_id`. Only one bookmark can be edited at a time.

use reqwest::Url;
use serde::Serialize;

use crate::types::bookmark::Bookmark;
use crate::types::errors::{FormError, ValidationError};

pub const HEADING_ADD: &str = "Add New Bookmark";
pub const HEADING_EDIT: &str = "Edit Bookmark";
pub const LABEL_ADD: &str = "Add Bookmark";
pub const LABEL_UPDATE: &str = "Update";
pub const LABEL_SAVING: &str = "Saving...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EditMode {
    Idle,
    Editing { target_id: String },
}

/// Validated form contents, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub url: String,
}

/// Checks a title/url pair. Both are trimmed; the url must be absolute http(s).
pub fn validate_fields(title: &str, url: &str) -> Result<Draft, ValidationError> {
    let title = title.trim();
    let url = url.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if url.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
        _ => return Err(ValidationError::InvalidUrl(url.to_string())),
    }
    Ok(Draft {
        title: title.to_string(),
        url: url.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct BookmarkForm {
    title: String,
    url: String,
    mode: EditMode,
    submitting: bool,
}

impl Default for BookmarkForm {
    fn default() -> Self {
        Self::new()
    }
}

impl BookmarkForm {
    pub fn new() -> Self {
        Self {
            title: String::new(),
            url: String::new(),
            mode: EditMode::Idle,
            submitting: false,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mode(&self) -> &EditMode {
        &self.mode
    }

    pub fn editing_id(&self) -> Option<&str> {
        match &self.mode {
            EditMode::Editing { target_id } => Some(target_id),
            EditMode::Idle => None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// Whether the edit control of row `id` is enabled.
    pub fn can_start_edit(&self, id: &str) -> bool {
        if self.submitting {
            return false;
        }
        match &self.mode {
            EditMode::Idle => true,
            EditMode::Editing { target_id } => target_id == id,
        }
    }

    /// Enters edit mode for `bookmark` and loads its fields.
    pub fn start_edit(&mut self, bookmark: &Bookmark) -> Result<(), FormError> {
        if self.submitting {
            return Err(FormError::Busy);
        }
        if let EditMode::Editing { target_id } = &self.mode {
            if *target_id != bookmark.id {
                return Err(FormError::EditInProgress(target_id.clone()));
            }
        }
        self.mode = EditMode::Editing {
            target_id: bookmark.id.clone(),
        };
        self.title = bookmark.title.clone();
        self.url = bookmark.url.clone();
        Ok(())
    }

    /// Leaves edit mode and clears the fields.
    pub fn cancel(&mut self) {
        self.mode = EditMode::Idle;
        self.clear();
    }

    pub fn validate(&self) -> Result<Draft, ValidationError> {
        validate_fields(&self.title, &self.url)
    }

    /// Marks a save as in flight. Fails if one already is.
    pub fn begin_submit(&mut self) -> Result<(), FormError> {
        if self.submitting {
            return Err(FormError::Busy);
        }
        self.submitting = true;
        Ok(())
    }

    /// Ends an in-flight save. An edit always returns to idle with empty
    /// fields; a create clears the fields only when it succeeded.
    pub fn finish_submit(&mut self, succeeded: bool) {
        self.submitting = false;
        match self.mode {
            EditMode::Editing { .. } => self.cancel(),
            EditMode::Idle if succeeded => self.clear(),
            EditMode::Idle => {}
        }
    }

    /// Drops edit mode if its target no longer exists.
    pub fn forget_target(&mut self, id: &str) {
        if self.editing_id() == Some(id) && !self.submitting {
            self.cancel();
        }
    }

    pub fn heading(&self) -> &'static str {
        match self.mode {
            EditMode::Idle => HEADING_ADD,
            EditMode::Editing { .. } => HEADING_EDIT,
        }
    }

    pub fn submit_label(&self) -> &'static str {
        if self.submitting {
            return LABEL_SAVING;
        }
        match self.mode {
            EditMode::Idle => LABEL_ADD,
            EditMode::Editing { .. } => LABEL_UPDATE,
        }
    }

    fn clear(&mut self) {
        self.title.clear();
        self.url.clear();
    }
}
