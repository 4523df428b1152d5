use serde::Serialize;

use super::bookmark::Bookmark;

/// A row-level change pushed by the change feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert(Bookmark),
    Update(Bookmark),
    Delete { id: String },
}

impl ChangeEvent {
    /// The id of the affected row.
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Insert(b) | ChangeEvent::Update(b) => &b.id,
            ChangeEvent::Delete { id } => id,
        }
    }
}

/// Connection state of a change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedStatus {
    /// The channel join was acknowledged; events will flow.
    Subscribed,
    /// The connection dropped; a reconnect is scheduled after `delay_ms`.
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// The feed has stopped for good (closed or out of retries).
    Closed,
}

/// Everything a change subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(ChangeEvent),
    Status(FeedStatus),
}
