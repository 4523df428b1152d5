//! The backend-as-a-service seam.
//!
//! Everything the view-model needs from the remote side is expressed as three
//! traits: [`AuthApi`] (OAuth sign-in, session lookup, auth-state
//! notifications), [`BookmarkTable`] (owner-scoped CRUD) and [`ChangeFeed`]
//! (push notifications for one owner). [`supabase::SupabaseBackend`] speaks
//! the real protocol; [`memory::MemoryServer`] is an in-process double.

pub mod memory;
pub mod supabase;

use tokio::sync::{broadcast, mpsc};

use crate::types::bookmark::{Bookmark, BookmarkPatch, NewBookmark};
use crate::types::change::FeedMessage;
use crate::types::errors::{AuthError, BookmarkError, RealtimeError};
use crate::types::session::{AuthEvent, AuthSession};

/// Capacity of auth-state broadcast channels.
pub const AUTH_EVENT_CAPACITY: usize = 16;

/// Authentication operations.
#[allow(async_fn_in_trait)]
pub trait AuthApi {
    /// The current session, refreshed if it is about to expire. `Ok(None)` when signed out.
    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError>;

    /// Registers for auth-state notifications. Dropping the listener unregisters it.
    fn subscribe_auth(&self) -> AuthListener;

    /// Starts an OAuth sign-in and returns the provider URL to redirect the user to.
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<String, AuthError>;

    /// Completes the OAuth flow with the code delivered to the redirect target.
    async fn exchange_code(&self, code: &str) -> Result<AuthSession, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Owner-scoped access to the bookmarks table.
#[allow(async_fn_in_trait)]
pub trait BookmarkTable {
    /// All bookmarks owned by `owner`, newest first.
    async fn select_owned(&self, owner: &str) -> Result<Vec<Bookmark>, BookmarkError>;

    /// Inserts a row and returns it with its server-assigned id and timestamp.
    async fn insert(&self, row: &NewBookmark) -> Result<Bookmark, BookmarkError>;

    /// Updates title/url of the row matching (id, owner) and returns the new row.
    async fn update(&self, id: &str, owner: &str, patch: &BookmarkPatch) -> Result<Bookmark, BookmarkError>;

    /// Deletes the row matching (id, owner).
    async fn delete(&self, id: &str, owner: &str) -> Result<(), BookmarkError>;
}

/// Push-change feed for the bookmarks table.
#[allow(async_fn_in_trait)]
pub trait ChangeFeed {
    /// Opens a subscription to changes of rows owned by `owner`.
    async fn subscribe(&self, owner: &str) -> Result<ChangeSubscription, RealtimeError>;
}

/// Everything the bookmark screen talks to.
pub trait Backend: AuthApi + BookmarkTable + ChangeFeed {}

impl<T: AuthApi + BookmarkTable + ChangeFeed> Backend for T {}

/// Receiving end of auth-state notifications.
pub struct AuthListener {
    rx: broadcast::Receiver<AuthEvent>,
}

impl AuthListener {
    pub fn new(rx: broadcast::Receiver<AuthEvent>) -> Self {
        Self { rx }
    }

    /// Next notification, or `None` once the sender is gone.
    ///
    /// Cancel safe. If the listener fell behind, skipped events are dropped and
    /// the next retained one is returned; every event carries the full state.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// A notification that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth listener lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

/// A live, owner-scoped change subscription.
///
/// Dropping or [closing](ChangeSubscription::close) the handle stops the feed;
/// the producer observes the closed channel and leaves the remote channel.
pub struct ChangeSubscription {
    owner: String,
    events: mpsc::UnboundedReceiver<FeedMessage>,
}

impl ChangeSubscription {
    pub fn new(owner: impl Into<String>, events: mpsc::UnboundedReceiver<FeedMessage>) -> Self {
        Self {
            owner: owner.into(),
            events,
        }
    }

    /// The owner this subscription is filtered by.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Next message, or `None` once the producer has stopped. Cancel safe.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.events.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_next(&mut self) -> Option<FeedMessage> {
        self.events.try_recv().ok()
    }

    pub fn close(mut self) {
        self.events.close();
    }
}
