//! Fetch-then-subscribe loader and live sync for one owner.
//!
//! [`LiveSync::start`] opens the owner-filtered push subscription first and
//! then fetches the full list, so no change made in between is lost. Feed
//! messages are then applied to the list as they arrive. After the feed
//! reports a reconnect, the next `Subscribed` asks for a full refetch because
//! events during the gap are gone.

use crate::backend::{BookmarkTable, ChangeFeed, ChangeSubscription};
use crate::managers::bookmark_list::BookmarkList;
use crate::types::change::{FeedMessage, FeedStatus};
use crate::types::errors::SyncError;

/// What the caller should do after a feed message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// A change was applied; `changed` is false for no-op echoes.
    Applied { changed: bool },
    /// The feed recovered from a gap; refetch the list.
    Refetch,
    /// Connection state update with nothing to do.
    Status(FeedStatus),
    /// The feed stopped and will not deliver further changes.
    Closed,
}

#[derive(Default)]
pub struct LiveSync {
    subscription: Option<ChangeSubscription>,
    status: Option<FeedStatus>,
    gap: bool,
}

impl LiveSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes for `list.owner()` and loads the list.
    ///
    /// A failed subscription still loads the list once; the error is
    /// returned after the fetch so the caller can report degraded sync.
    pub async fn start<B: BookmarkTable + ChangeFeed>(
        &mut self,
        backend: &B,
        list: &mut BookmarkList,
    ) -> Result<usize, SyncError> {
        self.close();
        self.status = None;
        let subscribed = match backend.subscribe(list.owner()).await {
            Ok(subscription) => {
                tracing::debug!(owner = %subscription.owner(), "change feed opened");
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "change feed unavailable");
                Err(SyncError::Subscribe(e.to_string()))
            }
        };
        let count = self.refetch(backend, list).await?;
        subscribed.map(|_| count)
    }

    /// Replaces the list with a fresh fetch of every owned bookmark.
    pub async fn refetch<B: BookmarkTable>(
        &mut self,
        backend: &B,
        list: &mut BookmarkList,
    ) -> Result<usize, SyncError> {
        let rows = backend.select_owned(list.owner()).await.map_err(|e| {
            tracing::error!(error = %e, "bookmark fetch failed");
            SyncError::Fetch(e.to_string())
        })?;
        list.replace_all(rows);
        tracing::info!(count = list.len(), "bookmarks loaded");
        Ok(list.len())
    }

    /// Next feed message. Pending forever when no feed is open; the end of
    /// the feed is reported once as `Status(Closed)`.
    pub async fn next(&mut self) -> FeedMessage {
        if let Some(subscription) = self.subscription.as_mut() {
            if let Some(message) = subscription.next().await {
                return message;
            }
            self.subscription = None;
            return FeedMessage::Status(FeedStatus::Closed);
        }
        std::future::pending().await
    }

    /// An already queued feed message, if any.
    pub fn try_next(&mut self) -> Option<FeedMessage> {
        self.subscription.as_mut()?.try_next()
    }

    pub fn handle(&mut self, message: FeedMessage, list: &mut BookmarkList) -> SyncAction {
        match message {
            FeedMessage::Change(event) => {
                let changed = list.apply(&event);
                tracing::debug!(id = event.id(), changed, "change applied");
                SyncAction::Applied { changed }
            }
            FeedMessage::Status(status) => {
                self.status = Some(status);
                match status {
                    FeedStatus::Reconnecting { .. } => {
                        self.gap = true;
                        SyncAction::Status(status)
                    }
                    FeedStatus::Subscribed if self.gap => {
                        self.gap = false;
                        SyncAction::Refetch
                    }
                    FeedStatus::Subscribed => SyncAction::Status(status),
                    FeedStatus::Closed => {
                        self.close();
                        SyncAction::Closed
                    }
                }
            }
        }
    }

    /// Closes the subscription, if any.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::debug!(owner = %subscription.owner(), "change feed closed");
            subscription.close();
        }
        self.gap = false;
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// Last connection status reported by the feed.
    pub fn status(&self) -> Option<FeedStatus> {
        self.status
    }
}
