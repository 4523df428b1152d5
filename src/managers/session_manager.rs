//! Session observer.
//!
//! Mirrors the backend's auth state into a local identity. The context is
//! created empty (still loading), filled by [`SessionContext::init`] on mount
//! and kept current by feeding it every auth notification.

use crate::backend::{AuthApi, AuthListener};
use crate::types::session::{AuthEvent, AuthUser};

/// How an auth notification changed the local identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    Unchanged,
    SignedIn,
    SignedOut,
    /// A different user replaced the previous one.
    Switched,
}

fn classify(before: Option<&AuthUser>, after: Option<&AuthUser>) -> IdentityChange {
    match (before, after) {
        (None, None) => IdentityChange::Unchanged,
        (None, Some(_)) => IdentityChange::SignedIn,
        (Some(_), None) => IdentityChange::SignedOut,
        (Some(a), Some(b)) if a.id == b.id => IdentityChange::Unchanged,
        (Some(_), Some(_)) => IdentityChange::Switched,
    }
}

#[derive(Default)]
pub struct SessionContext {
    user: Option<AuthUser>,
    listener: Option<AuthListener>,
    ready: bool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers for auth notifications and loads the current session.
    ///
    /// A failed lookup is logged and treated as signed out.
    pub async fn init<A: AuthApi>(&mut self, auth: &A) -> IdentityChange {
        self.listener = Some(auth.subscribe_auth());
        let user = match auth.get_session().await {
            Ok(session) => session.map(|s| s.user.clone()),
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed, continuing signed out");
                None
            }
        };
        self.ready = true;
        self.set_user(user)
    }

    /// Replaces the identity with the one carried by `event`.
    pub fn apply(&mut self, event: &AuthEvent) -> IdentityChange {
        tracing::debug!(kind = ?event.kind, "auth state changed");
        self.ready = true;
        self.set_user(event.user().cloned())
    }

    /// Waits for the next auth notification. Pending forever without a listener.
    pub async fn next_event(&mut self) -> AuthEvent {
        if let Some(listener) = self.listener.as_mut() {
            if let Some(event) = listener.recv().await {
                return event;
            }
            tracing::debug!("auth notifications ended");
            self.listener = None;
        }
        std::future::pending().await
    }

    /// An already queued auth notification, if any.
    pub fn try_next_event(&mut self) -> Option<AuthEvent> {
        self.listener.as_mut()?.try_recv()
    }

    /// Drops the local identity, e.g. after logout.
    pub fn clear(&mut self) -> IdentityChange {
        self.set_user(None)
    }

    /// Unregisters the auth listener.
    pub fn teardown(&mut self) {
        self.listener = None;
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    /// False until the first session lookup or notification.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    fn set_user(&mut self, user: Option<AuthUser>) -> IdentityChange {
        let change = classify(self.user.as_ref(), user.as_ref());
        self.user = user;
        change
    }
}
