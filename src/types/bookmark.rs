use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bookmark row as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload. `id` and `created_at` are assigned by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

/// Update payload. Only title and url are mutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookmarkPatch {
    pub title: String,
    pub url: String,
}
