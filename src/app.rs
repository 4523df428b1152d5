//! App core for SmartMarks.
//!
//! [`App`] is the single-screen view-model. It owns the session context, the
//! local bookmark list, the add/edit form, the live sync and the pending
//! notices, and exposes everything a front end needs: lifecycle (`mount`,
//! `unmount`), auth actions, form/list commands, an event pump
//! (`next_event` + `handle_event`) and a serializable [`ScreenView`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::Backend;
use crate::managers::bookmark_list::BookmarkList;
use crate::managers::bookmark_manager::{BookmarkManager, Confirm, DeleteOutcome, Notice, SubmitOutcome};
use crate::managers::edit_form::BookmarkForm;
use crate::managers::session_manager::{IdentityChange, SessionContext};
use crate::managers::sync_manager::{LiveSync, SyncAction};
use crate::services::auth_service::extract_code;
use crate::types::change::{ChangeEvent, FeedMessage, FeedStatus};
use crate::types::errors::{AuthError, CommandError, FormError};
use crate::types::session::{AuthEvent, AuthUser};
use crate::types::settings::AuthSettings;

/// Something that happened outside of a user action.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Auth(AuthEvent),
    Feed(FeedMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    pub id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    /// This row is the edit target.
    pub editing: bool,
    /// The row's edit control is enabled.
    pub edit_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormView {
    pub heading: String,
    pub title: String,
    pub url: String,
    pub submit_label: String,
    pub submitting: bool,
    pub editing_id: Option<String>,
}

/// Everything the screen shows, as plain data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum ScreenView {
    Loading,
    SignedOut {
        notices: Vec<Notice>,
    },
    SignedIn {
        user: UserView,
        rows: Vec<RowView>,
        form: FormView,
        live: bool,
        notices: Vec<Notice>,
    },
}

pub struct App<B: Backend> {
    backend: B,
    auth_settings: AuthSettings,
    session: SessionContext,
    list: Option<BookmarkList>,
    form: BookmarkForm,
    sync: LiveSync,
    notices: Vec<Notice>,
}

impl<B: Backend> App<B> {
    pub fn new(backend: B, auth_settings: AuthSettings) -> Self {
        Self {
            backend,
            auth_settings,
            session: SessionContext::new(),
            list: None,
            form: BookmarkForm::new(),
            sync: LiveSync::new(),
            notices: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.session.user()
    }

    pub fn bookmarks(&self) -> Option<&BookmarkList> {
        self.list.as_ref()
    }

    pub fn form(&self) -> &BookmarkForm {
        &self.form
    }

    pub fn is_live(&self) -> bool {
        self.sync.is_live()
    }

    // === Lifecycle ===

    /// Loads the current session and, when signed in, the bookmarks.
    pub async fn mount(&mut self) {
        let change = self.session.init(&self.backend).await;
        tracing::info!(signed_in = self.session.user().is_some(), "screen mounted");
        self.on_identity(change).await;
    }

    /// Stops listening for auth and feed events.
    pub fn unmount(&mut self) {
        self.sync.close();
        self.session.teardown();
        tracing::info!("screen unmounted");
    }

    // === Auth ===

    /// Starts OAuth sign-in and returns the URL to send the user to.
    pub async fn sign_in(&mut self) -> Result<String, AuthError> {
        let result = self
            .backend
            .sign_in_with_oauth(&self.auth_settings.provider, &self.auth_settings.redirect_to)
            .await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "sign-in could not start");
            self.notices.push(Notice::error(e.to_string()));
        }
        result
    }

    /// Finishes sign-in from the redirect URL (or the bare code).
    pub async fn complete_sign_in(&mut self, callback: &str) -> Result<(), AuthError> {
        let result = match extract_code(callback) {
            Ok(code) => self.backend.exchange_code(&code).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(session) => {
                let change = self.session.apply(&AuthEvent::signed_in(session));
                self.on_identity(change).await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "sign-in failed");
                self.notices.push(Notice::error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Signs out remotely and tears down all signed-in state.
    pub async fn sign_out(&mut self) {
        if let Err(e) = self.backend.sign_out().await {
            tracing::warn!(error = %e, "remote sign-out failed");
            self.notices.push(Notice::error(e.to_string()));
        }
        let change = self.session.clear();
        self.on_identity(change).await;
    }

    // === Form and list ===

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.form.set_title(title);
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.form.set_url(url);
    }

    pub fn start_edit(&mut self, id: &str) -> Result<(), FormError> {
        let bookmark = self
            .list
            .as_ref()
            .and_then(|list| list.get(id))
            .ok_or_else(|| FormError::UnknownBookmark(id.to_string()))?;
        self.form.start_edit(bookmark)
    }

    pub fn cancel_edit(&mut self) {
        self.form.cancel();
    }

    /// Creates or updates from the form. Failures are also queued as notices.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, CommandError> {
        let Some(list) = self.list.as_mut() else {
            return self.fail(CommandError::NotSignedIn);
        };
        let result = BookmarkManager::new(&self.backend)
            .submit(self.session.user(), &mut self.form, list)
            .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.fail(e),
        }
    }

    /// Deletes bookmark `id` if `confirm` agrees.
    pub async fn delete<C: Confirm + ?Sized>(
        &mut self,
        id: &str,
        confirm: &mut C,
    ) -> Result<DeleteOutcome, CommandError> {
        let Some(list) = self.list.as_mut() else {
            return self.fail(CommandError::NotSignedIn);
        };
        let result = BookmarkManager::new(&self.backend)
            .delete(self.session.user(), id, list, &mut self.form, confirm)
            .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.fail(e),
        }
    }

    // === Events ===

    /// Waits for the next auth or feed event. Cancel safe.
    pub async fn next_event(&mut self) -> AppEvent {
        tokio::select! {
            event = self.session.next_event() => AppEvent::Auth(event),
            message = self.sync.next() => AppEvent::Feed(message),
        }
    }

    /// An already queued event, auth first.
    pub fn try_next_event(&mut self) -> Option<AppEvent> {
        if let Some(event) = self.session.try_next_event() {
            return Some(AppEvent::Auth(event));
        }
        self.sync.try_next().map(AppEvent::Feed)
    }

    /// Applies an event. Returns whether the view may have changed.
    pub async fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Auth(event) => {
                let change = self.session.apply(&event);
                let changed = change != IdentityChange::Unchanged;
                self.on_identity(change).await;
                changed
            }
            AppEvent::Feed(message) => self.on_feed(message).await,
        }
    }

    /// Handles every queued event without waiting. Returns how many were handled.
    pub async fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.try_next_event() {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    // === View ===

    pub fn view(&self) -> ScreenView {
        if !self.session.is_ready() {
            return ScreenView::Loading;
        }
        let (Some(user), Some(list)) = (self.session.user(), self.list.as_ref()) else {
            return ScreenView::SignedOut {
                notices: self.notices.clone(),
            };
        };

        let editing_id = self.form.editing_id();
        let rows = list
            .iter()
            .map(|b| RowView {
                id: b.id.clone(),
                title: b.title.clone(),
                url: b.url.clone(),
                created_at: b.created_at,
                editing: editing_id == Some(b.id.as_str()),
                edit_enabled: self.form.can_start_edit(&b.id),
            })
            .collect();

        ScreenView::SignedIn {
            user: UserView {
                id: user.id.clone(),
                email: user.email.clone(),
            },
            rows,
            form: FormView {
                heading: self.form.heading().to_string(),
                title: self.form.title().to_string(),
                url: self.form.url().to_string(),
                submit_label: self.form.submit_label().to_string(),
                submitting: self.form.is_submitting(),
                editing_id: editing_id.map(str::to_string),
            },
            live: self.sync.is_live(),
            notices: self.notices.clone(),
        }
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // === Internals ===

    fn fail<T>(&mut self, error: CommandError) -> Result<T, CommandError> {
        self.notices.push(Notice::error(error.to_string()));
        Err(error)
    }

    async fn on_identity(&mut self, change: IdentityChange) {
        match change {
            IdentityChange::SignedIn | IdentityChange::Switched => self.load_for_user().await,
            IdentityChange::SignedOut => self.clear_user_state(),
            IdentityChange::Unchanged => {
                if self.session.user().is_some() && self.list.is_none() {
                    self.load_for_user().await;
                }
            }
        }
    }

    async fn load_for_user(&mut self) {
        let Some(owner) = self.session.user().map(|u| u.id.clone()) else {
            return;
        };
        self.form.cancel();
        let mut list = BookmarkList::new(owner);
        if let Err(e) = self.sync.start(&self.backend, &mut list).await {
            self.notices.push(Notice::error(e.to_string()));
        }
        self.list = Some(list);
    }

    fn clear_user_state(&mut self) {
        self.sync.close();
        self.list = None;
        self.form.cancel();
        tracing::debug!("signed-in state cleared");
    }

    async fn on_feed(&mut self, message: FeedMessage) -> bool {
        let Some(list) = self.list.as_mut() else {
            return false;
        };
        if let FeedMessage::Change(ChangeEvent::Delete { id }) = &message {
            self.form.forget_target(id);
        }
        match self.sync.handle(message, list) {
            SyncAction::Applied { changed } => changed,
            SyncAction::Refetch => {
                if let Err(e) = self.sync.refetch(&self.backend, list).await {
                    self.notices.push(Notice::error(e.to_string()));
                }
                true
            }
            SyncAction::Status(FeedStatus::Reconnecting { attempt, delay_ms }) => {
                tracing::debug!(attempt, delay_ms, "live updates reconnecting");
                true
            }
            SyncAction::Status(_) => true,
            SyncAction::Closed => {
                self.notices
                    .push(Notice::error("Live updates stopped; reload to resume"));
                true
            }
        }
    }
}
