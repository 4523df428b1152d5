//! In-process backend double.
//!
//! A [`MemoryServer`] holds the bookmarks table and the feed subscribers;
//! every [`MemoryClient`] is one signed-in (or signed-out) client of it.
//! The server applies the same owner policy the hosted backend enforces with
//! row-level security, assigns ids and timestamps, and pushes every change to
//! all subscribers of the row's owner no matter which client wrote it.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::{AuthApi, AuthListener, BookmarkTable, ChangeFeed, ChangeSubscription, AUTH_EVENT_CAPACITY};
use crate::types::bookmark::{Bookmark, BookmarkPatch, NewBookmark};
use crate::types::change::{ChangeEvent, FeedMessage, FeedStatus};
use crate::types::errors::{AuthError, BookmarkError, RealtimeError};
use crate::types::session::{AuthEvent, AuthEventKind, AuthSession, AuthUser};

/// Lifetime of sessions handed out by the memory backend.
const SESSION_TTL_SECS: i64 = 3600;

struct Subscriber {
    owner: String,
    tx: mpsc::UnboundedSender<FeedMessage>,
}

#[derive(Default)]
struct ServerState {
    rows: Vec<Bookmark>,
    subscribers: Vec<Subscriber>,
    last_created_at: Option<DateTime<Utc>>,
    requests: usize,
}

impl ServerState {
    /// Strictly increasing creation timestamps, even within one clock tick.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }

    fn publish(&mut self, owner: &str, event: ChangeEvent) {
        self.subscribers.retain(|sub| {
            if sub.owner != owner {
                return !sub.tx.is_closed();
            }
            sub.tx.send(FeedMessage::Change(event.clone())).is_ok()
        });
    }

    fn insert_row(&mut self, row: &NewBookmark) -> Bookmark {
        let bookmark = Bookmark {
            id: Uuid::new_v4().to_string(),
            title: row.title.clone(),
            url: row.url.clone(),
            user_id: row.user_id.clone(),
            created_at: self.next_timestamp(),
        };
        self.rows.push(bookmark.clone());
        self.publish(&bookmark.user_id, ChangeEvent::Insert(bookmark.clone()));
        bookmark
    }
}

/// Shared in-memory table plus change feed.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new signed-out client of this server.
    pub fn client(&self) -> MemoryClient {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        MemoryClient {
            server: self.clone(),
            session: Mutex::new(None),
            pending_flow: Mutex::new(None),
            events,
        }
    }

    /// Inserts a row directly, bypassing any client session.
    pub fn seed(&self, title: &str, url: &str, owner: &str) -> Bookmark {
        self.lock().insert_row(&NewBookmark {
            title: title.to_string(),
            url: url.to_string(),
            user_id: owner.to_string(),
        })
    }

    /// Snapshot of every row, in insertion order.
    pub fn rows(&self) -> Vec<Bookmark> {
        self.lock().rows.clone()
    }

    /// Number of table requests served so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    /// Number of live feed subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|sub| !sub.tx.is_closed());
        state.subscribers.len()
    }

    /// Tells every subscriber its connection dropped and came back.
    pub fn simulate_reconnect(&self) {
        let mut state = self.lock();
        state.subscribers.retain(|sub| {
            sub.tx
                .send(FeedMessage::Status(FeedStatus::Reconnecting { attempt: 1, delay_ms: 0 }))
                .and_then(|_| sub.tx.send(FeedMessage::Status(FeedStatus::Subscribed)))
                .is_ok()
        });
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One client session against a [`MemoryServer`].
pub struct MemoryClient {
    server: MemoryServer,
    session: Mutex<Option<AuthSession>>,
    pending_flow: Mutex<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl MemoryClient {
    pub fn server(&self) -> &MemoryServer {
        &self.server
    }

    /// Re-issues the current session's tokens and notifies listeners.
    pub fn refresh_token(&self) {
        let refreshed = {
            let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(current) = session.as_mut() {
                current.access_token = format!("memory-access-{}", Uuid::new_v4());
                current.expires_at = Utc::now().timestamp() + SESSION_TTL_SECS;
            }
            session.clone()
        };
        if let Some(session) = refreshed {
            let _ = self.events.send(AuthEvent {
                kind: AuthEventKind::TokenRefreshed,
                session: Some(session),
            });
        }
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.session
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|s| s.user.clone())
    }

    /// Checks the caller is signed in as `owner` and counts the request.
    fn authorize(&self, owner: &str) -> Result<bool, BookmarkError> {
        self.server.lock().requests += 1;
        let user = self.current_user().ok_or(BookmarkError::NotAuthenticated)?;
        Ok(user.id == owner)
    }
}

impl AuthApi for MemoryClient {
    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError> {
        Ok(self.session.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn subscribe_auth(&self) -> AuthListener {
        AuthListener::new(self.events.subscribe())
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<String, AuthError> {
        *self.pending_flow.lock().unwrap_or_else(|p| p.into_inner()) = Some(provider.to_string());
        Ok(format!(
            "memory://authorize?provider={}&redirect_to={}",
            provider, redirect_to
        ))
    }

    /// The code is taken as the user id to sign in as.
    async fn exchange_code(&self, code: &str) -> Result<AuthSession, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::MissingCode("empty code".to_string()));
        }
        self.pending_flow.lock().unwrap_or_else(|p| p.into_inner()).take();

        let session = AuthSession {
            access_token: format!("memory-access-{}", Uuid::new_v4()),
            refresh_token: format!("memory-refresh-{}", Uuid::new_v4()),
            expires_at: Utc::now().timestamp() + SESSION_TTL_SECS,
            user: AuthUser {
                id: code.to_string(),
                email: Some(format!("{}@example.com", code)),
            },
        };
        *self.session.lock().unwrap_or_else(|p| p.into_inner()) = Some(session.clone());
        let _ = self.events.send(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.session.lock().unwrap_or_else(|p| p.into_inner()).take();
        let _ = self.events.send(AuthEvent::signed_out());
        Ok(())
    }
}

impl BookmarkTable for MemoryClient {
    async fn select_owned(&self, owner: &str) -> Result<Vec<Bookmark>, BookmarkError> {
        if !self.authorize(owner)? {
            // Row-level security filters foreign rows instead of failing.
            return Ok(Vec::new());
        }
        let mut rows: Vec<Bookmark> = self
            .server
            .lock()
            .rows
            .iter()
            .filter(|b| b.user_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, row: &NewBookmark) -> Result<Bookmark, BookmarkError> {
        if !self.authorize(&row.user_id)? {
            return Err(BookmarkError::Unauthorized(
                "new row violates row-level security policy".to_string(),
            ));
        }
        Ok(self.server.lock().insert_row(row))
    }

    async fn update(&self, id: &str, owner: &str, patch: &BookmarkPatch) -> Result<Bookmark, BookmarkError> {
        if !self.authorize(owner)? {
            return Err(BookmarkError::NotFound(id.to_string()));
        }
        let mut state = self.server.lock();
        let row = state
            .rows
            .iter_mut()
            .find(|b| b.id == id && b.user_id == owner)
            .ok_or_else(|| BookmarkError::NotFound(id.to_string()))?;
        row.title = patch.title.clone();
        row.url = patch.url.clone();
        let updated = row.clone();
        state.publish(owner, ChangeEvent::Update(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, id: &str, owner: &str) -> Result<(), BookmarkError> {
        if !self.authorize(owner)? {
            return Err(BookmarkError::NotFound(id.to_string()));
        }
        let mut state = self.server.lock();
        let before = state.rows.len();
        state.rows.retain(|b| !(b.id == id && b.user_id == owner));
        if state.rows.len() == before {
            return Err(BookmarkError::NotFound(id.to_string()));
        }
        state.publish(owner, ChangeEvent::Delete { id: id.to_string() });
        Ok(())
    }
}

impl ChangeFeed for MemoryClient {
    async fn subscribe(&self, owner: &str) -> Result<ChangeSubscription, RealtimeError> {
        let user = self.current_user().ok_or(RealtimeError::NotAuthenticated)?;
        if user.id != owner {
            return Err(RealtimeError::JoinRejected(format!(
                "filter user_id=eq.{} does not match the session",
                owner
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(FeedMessage::Status(FeedStatus::Subscribed));
        self.server.lock().subscribers.push(Subscriber {
            owner: owner.to_string(),
            tx,
        });
        Ok(ChangeSubscription::new(owner, rx))
    }
}
