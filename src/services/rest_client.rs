//! PostgREST access to the bookmarks table.
//!
//! Every request carries the project `apikey` and the signed-in user's bearer
//! token; the backend's row-level security decides what the token may see.
//! Mutations ask for `Prefer: return=representation` so the affected rows come
//! back in the response.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::types::bookmark::{Bookmark, BookmarkPatch, NewBookmark};
use crate::types::errors::BookmarkError;

const PREFER_REPRESENTATION: &str = "return=representation";

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: String,
    #[serde(default)]
    details: Option<String>,
}

/// Query parameters selecting every bookmark of `owner`, newest first.
pub fn select_owned_query(owner: &str) -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".to_string()),
        ("user_id", format!("eq.{}", owner)),
        ("order", "created_at.desc".to_string()),
    ]
}

/// Query parameters matching exactly the (id, owner) row.
pub fn row_filter(id: &str, owner: &str) -> Vec<(&'static str, String)> {
    vec![
        ("id", format!("eq.{}", id)),
        ("user_id", format!("eq.{}", owner)),
    ]
}

/// Maps a non-success status and body into a [`BookmarkError`].
pub fn error_from_response(status: StatusCode, body: &str) -> BookmarkError {
    let message = match serde_json::from_str::<PostgrestError>(body) {
        Ok(err) => match err.details {
            Some(details) if !details.is_empty() => format!("{} ({})", err.message, details),
            _ => err.message,
        },
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BookmarkError::Unauthorized(message),
        _ => BookmarkError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

/// HTTP client for `/rest/v1/<table>`.
pub struct RestClient {
    http: reqwest::Client,
    table_url: String,
    anon_key: String,
}

impl RestClient {
    pub fn new(http: reqwest::Client, base_url: &str, anon_key: &str, table: &str) -> Self {
        Self {
            http,
            table_url: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            anon_key: anon_key.to_string(),
        }
    }

    pub fn table_url(&self) -> &str {
        &self.table_url
    }

    fn authorized(&self, request: RequestBuilder, access_token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }

    async fn send(request: RequestBuilder) -> Result<Response, BookmarkError> {
        let response = request
            .send()
            .await
            .map_err(|e| BookmarkError::NetworkError(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &body))
    }

    async fn rows(request: RequestBuilder) -> Result<Vec<Bookmark>, BookmarkError> {
        Self::send(request)
            .await?
            .json::<Vec<Bookmark>>()
            .await
            .map_err(|e| BookmarkError::DecodeError(e.to_string()))
    }

    #[tracing::instrument(skip(self, access_token))]
    pub async fn select_owned(&self, access_token: &str, owner: &str) -> Result<Vec<Bookmark>, BookmarkError> {
        let request = self
            .authorized(self.http.get(&self.table_url), access_token)
            .query(&select_owned_query(owner));
        let rows = Self::rows(request).await?;
        tracing::debug!(count = rows.len(), "fetched bookmarks");
        Ok(rows)
    }

    #[tracing::instrument(skip(self, access_token, row), fields(owner = %row.user_id))]
    pub async fn insert(&self, access_token: &str, row: &NewBookmark) -> Result<Bookmark, BookmarkError> {
        let request = self
            .authorized(self.http.post(&self.table_url), access_token)
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&[row]);
        Self::rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BookmarkError::DecodeError("insert returned no rows".to_string()))
    }

    #[tracing::instrument(skip(self, access_token, patch))]
    pub async fn update(
        &self,
        access_token: &str,
        id: &str,
        owner: &str,
        patch: &BookmarkPatch,
    ) -> Result<Bookmark, BookmarkError> {
        let request = self
            .authorized(self.http.patch(&self.table_url), access_token)
            .header("Prefer", PREFER_REPRESENTATION)
            .query(&row_filter(id, owner))
            .json(patch);
        Self::rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BookmarkError::NotFound(id.to_string()))
    }

    #[tracing::instrument(skip(self, access_token))]
    pub async fn delete(&self, access_token: &str, id: &str, owner: &str) -> Result<(), BookmarkError> {
        let request = self
            .authorized(self.http.delete(&self.table_url), access_token)
            .header("Prefer", PREFER_REPRESENTATION)
            .query(&row_filter(id, owner));
        if Self::rows(request).await?.is_empty() {
            return Err(BookmarkError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
